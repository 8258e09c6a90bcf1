pub mod file_service;
pub mod upload_service;
