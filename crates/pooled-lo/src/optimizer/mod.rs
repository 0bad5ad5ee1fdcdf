mod interface;
mod pooled_lo;
mod state;
mod thread_cache;
#[cfg(test)]
mod tests;

pub use interface::*;
pub use pooled_lo::*;
pub use state::*;
