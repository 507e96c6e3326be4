use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::guard::Profile;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let introspect_token = matches
        .get_one::<String>("introspect-token")
        .map(|token| SecretString::from(token.to_string()))
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --introspect-token"))?;

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches.get_one::<String>("dsn").map(String::to_string),
        profile: matches
            .get_one::<Profile>("profile")
            .copied()
            .unwrap_or(Profile::Standard),
        introspect_url: matches
            .get_one::<String>("introspect-url")
            .map(String::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --introspect-url"))?,
        threat_feed_url: matches
            .get_one::<String>("threat-feed-url")
            .map(String::to_string),
        exclude_paths: matches
            .get_many::<String>("exclude-path")
            .map(|paths| paths.cloned().collect())
            .unwrap_or_default(),
        console_origin: matches
            .get_one::<String>("console-origin")
            .map_or_else(|| "http://localhost:5173".to_string(), String::to_string),
    };

    Ok((action, GlobalArgs::new(introspect_token)))
}
