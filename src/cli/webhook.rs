use anyhow::{Context, Result, bail};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use super::flag_value;
use crate::core::akool::{CallbackPayload, WebhookEnvelope, WebhookVerifier};
use crate::core::config::AppConfig;
use crate::core::terminal::GuideSection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SealArgs {
    pub payload: String,
    pub nonce: Option<String>,
    pub timestamp: Option<i64>,
}

pub(crate) fn parse_seal_args(args: &[String]) -> Result<SealArgs> {
    let mut payload = None;
    let mut nonce = None;
    let mut timestamp = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--payload" | "-p" => {
                payload = Some(flag_value(args, i)?);
                i += 2;
            }
            "--nonce" => {
                nonce = Some(flag_value(args, i)?);
                i += 2;
            }
            "--timestamp" => {
                let raw = flag_value(args, i)?;
                timestamp = Some(
                    raw.parse()
                        .with_context(|| format!("--timestamp must be milliseconds, got '{}'", raw))?,
                );
                i += 2;
            }
            other => bail!("unexpected argument '{}' for webhook seal", other),
        }
    }
    let Some(payload) = payload else {
        bail!("--payload is required for webhook seal");
    };
    Ok(SealArgs {
        payload,
        nonce,
        timestamp,
    })
}

pub fn run_webhook_command(config: &AppConfig, args: &[String]) -> Result<()> {
    let sub_cmd = args.first().map(String::as_str).unwrap_or("");
    match sub_cmd {
        "verify" => {
            let Some(source) = args.get(1) else {
                bail!("webhook verify needs a file path, or - for stdin");
            };
            let body = read_source(source)?;
            let verifier = verifier(config)?;
            let opened = verify_envelope(&verifier, &body)?;
            println!("{}", serde_json::to_string_pretty(&opened)?);
            Ok(())
        }
        "seal" => {
            let parsed = parse_seal_args(&args[1..])?;
            let verifier = verifier(config)?;
            let envelope = seal_envelope(&verifier, &parsed)?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        _ => {
            GuideSection::new("Akool Webhooks")
                .command("webhook verify <file|->", "Verify and decrypt a callback envelope")
                .command("webhook seal --payload <json>", "Build a signed, encrypted envelope")
                .print();
            bail!("unknown or missing webhook command. Expected: verify, seal")
        }
    }
}

fn verifier(config: &AppConfig) -> Result<WebhookVerifier> {
    let credentials = config
        .akool
        .credentials()
        .context("webhook commands need Akool credentials")?;
    Ok(WebhookVerifier::new(credentials))
}

fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading envelope from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(source).with_context(|| format!("reading envelope from {}", source))
    }
}

pub(crate) fn verify_envelope(verifier: &WebhookVerifier, body: &[u8]) -> Result<serde_json::Value> {
    let envelope = WebhookEnvelope::from_json(body)?;
    let value = verifier.open(&envelope)?;
    match CallbackPayload::from_value(&value) {
        Ok(payload) => info!(
            "Callback for task {} ({}, {})",
            payload.id,
            payload.kind,
            payload.status.label()
        ),
        Err(e) => info!("Decrypted body is not a task callback: {}", e),
    }
    Ok(value)
}

pub(crate) fn seal_envelope(verifier: &WebhookVerifier, args: &SealArgs) -> Result<WebhookEnvelope> {
    // Sealed exactly as given so the ciphertext matches what a sender would produce.
    serde_json::from_str::<serde_json::Value>(&args.payload).context("--payload is not valid JSON")?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before 1970")?;
    let timestamp = args.timestamp.unwrap_or(now.as_millis() as i64);
    let nonce = args
        .nonce
        .clone()
        .unwrap_or_else(|| (now.subsec_nanos() % 10_000).to_string());

    Ok(verifier.seal(&args.payload, timestamp, &nonce)?)
}
