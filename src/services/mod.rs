pub mod file_helper;
pub mod progress_hub;
pub mod upload_service;
