pub mod delivery;
pub mod gallery_cache;
pub mod gallery_index;
pub mod storage_service;
pub mod upload_service;
