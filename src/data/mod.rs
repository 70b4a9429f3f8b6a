pub mod feed;
pub mod storage;
