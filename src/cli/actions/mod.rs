pub mod server;

use crate::guard::Profile;

/// Actions the CLI can dispatch to.
pub enum Action {
    Server {
        port: u16,
        dsn: Option<String>,
        profile: Profile,
        introspect_url: String,
        threat_feed_url: Option<String>,
        exclude_paths: Vec<String>,
        console_origin: String,
    },
}
