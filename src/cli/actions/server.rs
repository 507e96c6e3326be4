use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::guard::GuardConfig;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            profile,
            introspect_url,
            threat_feed_url,
            exclude_paths,
            console_origin,
        } => {
            let config = GuardConfig::for_profile(profile).with_excluded_paths(exclude_paths);

            api::new(
                port,
                dsn,
                config,
                introspect_url,
                threat_feed_url,
                console_origin,
                globals,
            )
            .await?;
        }
    }

    Ok(())
}
