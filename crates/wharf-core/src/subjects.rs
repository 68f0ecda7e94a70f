//! Logical subject names the pipeline agrees on (spec §6).
//!
//! `RENDER_DONE` is not named explicitly in the subject table but is implied
//! by it: manifestRenderer's output must be deployer's input for the
//! create/update/delete chain to reach its `deploy.done` terminal.

pub const PROJECT_OP_START: &str = "project-op.start";
pub const REGISTRATION_DONE: &str = "registration.done";
pub const BOOTSTRAP_DONE: &str = "bootstrap.done";
pub const BUILD_DONE: &str = "build.done";
pub const RENDER_DONE: &str = "render.done";
pub const DEPLOY_DONE: &str = "deploy.done";

pub const DEPLOYMENT_START: &str = "deployment.start";
pub const DEPLOYMENT_DONE: &str = "deployment.done";

pub const PROMOTION_START: &str = "promotion.start";
pub const PROMOTION_DONE: &str = "promotion.done";

pub const WORKERS_POISON: &str = "workers.poison";

/// All terminal subjects the final-result subscriber must consume (spec §4.7).
pub const TERMINAL_SUBJECTS: &[&str] = &[DEPLOY_DONE, DEPLOYMENT_DONE, PROMOTION_DONE];
