//! `login`: authenticate once, then remember the instance in a profile.

use std::sync::Arc;

use dialoguer::Input;

use halink_config::KeyringCredentialStore;
use halink_core::{
    ConnectionConfig, Controller, CredentialStore, MemoryCredentialStore, TlsVerification,
};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config;
use crate::error::CliError;

use super::util::prompt_err;

pub async fn handle(args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config()?;
    let profile_name = config::active_profile_name(global, &cfg);
    let existing = cfg.profiles.get(&profile_name).cloned();

    let url = match (global.url.clone(), existing.as_ref()) {
        (Some(url), _) => url,
        (None, Some(profile)) if !profile.url.is_empty() => profile.url.clone(),
        _ => Input::new()
            .with_prompt("Home Assistant URL")
            .default("http://homeassistant.local:8123".into())
            .interact_text()
            .map_err(prompt_err)?,
    };
    let token = match global.token.clone() {
        Some(token) => token,
        None => rpassword::prompt_password("Long-lived access token: ").map_err(prompt_err)?,
    };

    let mut conn = match existing {
        Some(ref profile) => halink_config::profile_to_connection_config(profile)?,
        None => ConnectionConfig::default(),
    };
    if global.insecure {
        conn.tls = TlsVerification::DangerAcceptInvalid;
    }

    // The controller persists url + token through this store once they
    // validate, before the handshake.
    let store: Arc<dyn CredentialStore> = if args.no_keyring {
        Arc::new(MemoryCredentialStore::new())
    } else {
        Arc::new(KeyringCredentialStore::new(profile_name.clone()))
    };
    let controller = Controller::new(conn, store);
    controller.init_connection(&url, &token).await?;
    let entities = controller.store().entity_count();
    controller.force_disconnect();

    let profile = cfg.profiles.entry(profile_name.clone()).or_default();
    profile.url = url.trim().to_owned();
    profile.token = args.no_keyring.then(|| token.trim().to_owned());
    if cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.clone());
    }
    config::save_config(&cfg)?;

    if !global.quiet {
        eprintln!(
            "✓ Logged in to {} ({entities} entities), saved as profile '{profile_name}'",
            url.trim()
        );
    }
    Ok(())
}
