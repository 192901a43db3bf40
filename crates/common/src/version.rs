/// Build information stamped at compile time by `build.rs`
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
}

/// Report the build info embedded in this binary
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("REPO_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
    }
}
