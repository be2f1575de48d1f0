pub mod item_ctx;
pub mod page_flow;

pub use item_ctx::ItemCtx;
pub use page_flow::{PageFlow, WindowReport};
