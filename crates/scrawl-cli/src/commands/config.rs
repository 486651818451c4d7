use std::env;

use scrawl_core::config::normalize_api_base_url;
use scrawl_core::OwnerId;

use crate::cli::ConfigCommands;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            owner_id,
            api_base_url,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            owner_id,
            api_base_url,
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    owner_id: Option<String>,
    api_base_url: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    merge_profile(
        profile,
        owner_id.or_else(|| env::var("SCRAWL_OWNER_ID").ok()),
        api_base_url.or_else(|| env::var("SCRAWL_API_BASE_URL").ok()),
    )?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    Ok(())
}

/// Overlay explicit values on an existing profile, validating each one.
pub fn merge_profile(
    profile: &mut CliProfile,
    owner_id: Option<String>,
    api_base_url: Option<String>,
) -> Result<(), CliError> {
    if let Some(owner_id) = normalize_text_option(owner_id) {
        OwnerId::new(owner_id.as_str())?;
        profile.owner_id = Some(owner_id);
    }
    if let Some(url) = normalize_text_option(api_base_url) {
        profile.api_base_url = Some(normalize_api_base_url(&url)?);
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    println!("profile:      {profile_name}");
    for line in format_profile_lines(profile)? {
        println!("{line}");
    }
    Ok(())
}

pub fn format_profile_lines(profile: &CliProfile) -> Result<Vec<String>, CliError> {
    let owner_id = profile.owner_id().map_err(CliError::Config)?;
    let api_base_url = profile
        .api_base_url()
        .map_err(CliError::Config)?
        .unwrap_or_else(|| "(local only)".to_string());
    let settings = profile.sync_settings().map_err(CliError::Config)?;

    Ok(vec![
        format!("owner_id:     {owner_id}"),
        format!("api_base_url: {api_base_url}"),
        format!(
            "sync:         timeout={}s backoff={}ms..{}s pull={}s senders={}",
            settings.request_timeout_secs,
            settings.initial_backoff_ms,
            settings.max_backoff_secs,
            settings.pull_interval_secs,
            settings.max_concurrent_sends
        ),
    ])
}
