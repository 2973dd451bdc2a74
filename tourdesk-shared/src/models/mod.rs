pub mod events;
pub mod paging;
