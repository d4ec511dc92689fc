//! Log output setup

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber
///
/// `RUST_LOG` wins over the verbosity-derived default. Calling this again
/// after a subscriber is installed does nothing.
pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "homesync=warn",
        1 => "homesync=info",
        2 => "homesync=debug",
        _ => "homesync=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(1);
        init(3);
        tracing::info!("logging initialized");
    }
}
