pub mod blob_extractor;
pub mod device;
pub mod input;
pub mod point_cloud;
pub mod roi;
pub mod session;
pub mod synthetic;
pub mod threshold;
