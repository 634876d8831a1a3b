pub mod device_repo;
pub mod job_log_repo;
pub mod job_repo;
pub mod region_repo;

pub use device_repo::DeviceRepo;
pub use job_log_repo::{JobLogRepo, JOB_LOG_CHANNEL};
pub use job_repo::JobRepo;
pub use region_repo::RegionRepo;
