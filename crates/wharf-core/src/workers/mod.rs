//! Stage workers (spec §2 item 7, §4.6).
//!
//! Each module implements [`crate::worker_runtime::WorkerAction`] for one
//! worker role. All of them follow the same shape: `markStepStart`, do the
//! work, `markStepEnd` on either branch (spec §4.2 step 2).

pub mod deployer;
pub mod image_builder;
pub mod manifest_renderer;
pub mod promoter;
pub mod registrar;
pub mod repo_bootstrap;

pub use deployer::DeployerAction;
pub use image_builder::ImageBuilderAction;
pub use manifest_renderer::ManifestRendererAction;
pub use promoter::PromoterAction;
pub use registrar::RegistrarAction;
pub use repo_bootstrap::RepoBootstrapAction;
