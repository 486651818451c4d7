use crate::auth::{clear_access_token, resolve_access_token, store_access_token};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    match command {
        AuthCommands::Login { profile, token } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            if config.profile(&profile_name).is_none() {
                return Err(CliError::Config(format!(
                    "Profile '{profile_name}' is not configured. Run `scrawl config init --profile {profile_name}` first."
                )));
            }
            store_access_token(&profile_name, &token)?;
            println!("Stored access token for profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            match resolve_access_token(&profile_name)? {
                Some((_, source)) => println!(
                    "Profile '{profile_name}' has an access token (from {})",
                    source.as_str()
                ),
                None => println!("Profile '{profile_name}' is not signed in."),
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            clear_access_token(&profile_name)?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}
