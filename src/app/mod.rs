pub mod ports;
pub mod business_pull_use_case;
pub mod rfp_pull_use_case;

pub use business_pull_use_case::BusinessPullUseCase;
pub use rfp_pull_use_case::RfpPullUseCase;
