mod engine;
mod model;

pub use engine::ProfileSet;
pub use model::{
    ApproverConfig, PermissionProfile, ProfileDefinition, RequestAttributes, INSECURE_PROFILE_NAME,
};
