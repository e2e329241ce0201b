//! Cross-region inference (CRI) profile table (spec.md §4.D step 2 /
//! SPEC_FULL.md §2): maps a profile tag to the regional prefix Bedrock
//! expects prepended to a model id.

pub const DEFAULT_PROFILE: &str = "us";

pub fn prefix_for(profile: &str) -> Option<&'static str> {
    match profile {
        "global" => Some(""),
        "us" => Some("us."),
        "eu" => Some("eu."),
        "apac" => Some("apac."),
        "jp" => Some("jp."),
        "au" => Some("au."),
        _ => None,
    }
}

/// Resolves the CRI profile to use: an explicit env override takes
/// precedence over the default, and the caller is expected to have already
/// checked the model's `supported_cri_profiles`.
pub fn resolve_profile() -> String {
    std::env::var("BEDROCK_CRI_REGION_OVERRIDE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string())
}

pub fn apply(profile: &str, model_id: &str) -> String {
    let prefix = prefix_for(profile).unwrap_or("");
    format!("{prefix}{model_id}")
}
