//! `cutover deploy` — run one full swap.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use cutover_core::{CutoverConfig, DeploymentRequest, EnvSettings};
use cutover_health::HttpProbe;
use cutover_notify::{Notifier, NullNotifier, WebhookNotifier};
use cutover_proxy::NginxController;
use cutover_runtime::ContainerCli;
use cutover_swap::Swap;

pub async fn deploy(
    artifact: String,
    config_path: &Path,
    extra_env: Vec<String>,
    volumes: Vec<String>,
) -> anyhow::Result<()> {
    let config = CutoverConfig::load_or_default(config_path)?;
    let env = EnvSettings::from_env();

    let runtime = Arc::new(ContainerCli::detect()?);
    let proxy = Arc::new(NginxController::new(
        config.proxy.config_path.clone(),
        config.proxy.nginx_bin.clone(),
    ));
    let probe = Arc::new(HttpProbe::new(Duration::from_secs(config.health.timeout_secs)));
    let notifier: Arc<dyn Notifier> = match &env.notify_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NullNotifier),
    };

    let mut request = DeploymentRequest::new(artifact);
    request.extra_env = parse_env_pairs(&extra_env)?;
    request.volumes = volumes;

    let swap = Swap::new(config, env, runtime, proxy, probe, notifier);
    match swap.run(&request).await {
        Ok(outcome) => {
            println!("✓ {}", outcome.reason);
            Ok(())
        }
        Err(failure) => {
            if let Some(logs) = &failure.diagnostics {
                eprintln!("--- target instance logs ---");
                eprintln!("{}", logs.trim_end());
                eprintln!("----------------------------");
            }
            eprintln!("Deploy failed: {failure}");
            Err(failure.into())
        }
    }
}

fn parse_env_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .with_context(|| format!("invalid --env '{pair}', expected KEY=VALUE"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_parse() {
        let pairs = vec!["A=1".to_string(), "URL=http://host:5000/x=y".to_string()];
        let parsed = parse_env_pairs(&pairs).unwrap();
        assert_eq!(parsed[0], ("A".to_string(), "1".to_string()));
        // Only the first '=' splits.
        assert_eq!(parsed[1].1, "http://host:5000/x=y");
    }

    #[test]
    fn env_pairs_reject_missing_separator() {
        let pairs = vec!["NOT_A_PAIR".to_string()];
        assert!(parse_env_pairs(&pairs).is_err());
    }
}
