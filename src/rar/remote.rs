//! Clients for the services reached over HTTP: IP lookup, reCAPTCHA and the
//! persistence relay.

use serde::Deserialize;

use rar_form::record::SubmissionRecord;
use rar_form::session::{HumanVerifier, SubmissionSink, Verdict};

use crate::rar::*;

/// Written in place of the address when it cannot be found.
pub const IP_UNAVAILABLE: &str = "Unavailable";

pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("rarform/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[derive(Deserialize, Debug)]
struct IpReply {
    ip: String,
}

fn fetch_ip(agent: &ureq::Agent, url: &str) -> RarResult<String> {
    let reply: IpReply = agent
        .get(url)
        .call()
        .context(RemoteSnafu { url })?
        .into_json()
        .context(OpeningJsonSnafu { path: url })?;
    Ok(reply.ip)
}

/// The public address of this machine, or `Unavailable`. Never fails.
pub fn lookup_ip(agent: &ureq::Agent, url: Option<&str>) -> String {
    let url = match url {
        Some(u) => u,
        None => return IP_UNAVAILABLE.to_string(),
    };
    match fetch_ip(agent, url) {
        Ok(ip) if !ip.trim().is_empty() => ip,
        Ok(_) => IP_UNAVAILABLE.to_string(),
        Err(e) => {
            warn!("lookup_ip: {}", e);
            IP_UNAVAILABLE.to_string()
        }
    }
}

// **** Human verification ****

#[derive(Deserialize, Debug, Default)]
struct SiteVerifyReply {
    success: bool,
    score: Option<f64>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

fn verdict(reply: &SiteVerifyReply, threshold: f64) -> Verdict {
    if !reply.success {
        return Verdict {
            passed: false,
            reason: Some(if reply.error_codes.is_empty() {
                "invalid token".to_string()
            } else {
                reply.error_codes.join(", ")
            }),
            score: reply.score,
        };
    }
    match reply.score {
        Some(s) => Verdict {
            passed: s > threshold,
            reason: if s > threshold {
                None
            } else {
                Some(format!("score {} is not above {}", s, threshold))
            },
            score: Some(s),
        },
        None => {
            warn!("verdict: no score available but the token is valid, accepting");
            Verdict {
                passed: true,
                reason: None,
                score: None,
            }
        }
    }
}

pub struct RecaptchaVerifier {
    agent: ureq::Agent,
    settings: RecaptchaSettings,
}

impl RecaptchaVerifier {
    pub fn new(agent: ureq::Agent, settings: &RecaptchaSettings) -> RecaptchaVerifier {
        RecaptchaVerifier {
            agent,
            settings: settings.clone(),
        }
    }
}

impl HumanVerifier for RecaptchaVerifier {
    fn verify(&mut self, token: &str, remote_ip: Option<&str>) -> Result<Verdict, String> {
        let secret = match &self.settings.secret {
            Some(s) => s.as_str(),
            None => {
                warn!("verify: no reCAPTCHA secret configured, refusing");
                return Ok(Verdict {
                    passed: false,
                    reason: Some("not configured".to_string()),
                    score: None,
                });
            }
        };
        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip.filter(|ip| *ip != IP_UNAVAILABLE) {
            form.push(("remoteip", ip));
        }
        let endpoint = self.settings.endpoint.as_str();
        let reply: SiteVerifyReply = self
            .agent
            .post(endpoint)
            .send_form(&form)
            .context(RemoteSnafu { url: endpoint })
            .and_then(|r| r.into_json().context(OpeningJsonSnafu { path: endpoint }))
            .map_err(|e| e.to_string())?;
        debug!("verify: {:?}", reply);
        Ok(verdict(&reply, self.settings.threshold))
    }
}

// **** Relay ****

#[derive(Deserialize, Debug)]
struct RelayReply {
    status: String,
    message: Option<String>,
    #[serde(rename = "submissionId")]
    submission_id: Option<String>,
}

/// Reads the reply of the relay: the stored identifier, if it gave one, or the message to show.
fn interpret_reply(body: &str) -> Result<Option<String>, String> {
    let reply: RelayReply = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            warn!("interpret_reply: not a reply ({}): {:?}", e, body);
            return Err("Invalid response from the persistence relay.".to_string());
        }
    };
    if reply.status == "success" {
        Ok(reply.submission_id)
    } else {
        warn!("interpret_reply: relay error: {:?}", reply.message);
        Err(reply
            .message
            .unwrap_or_else(|| "Failed to save data to the sheet.".to_string()))
    }
}

/// Posts submissions to a remote endpoint speaking the `append` protocol.
pub struct RelaySink {
    agent: ureq::Agent,
    url: String,
}

impl RelaySink {
    pub fn new(agent: ureq::Agent, url: &str) -> RelaySink {
        RelaySink {
            agent,
            url: url.to_string(),
        }
    }
}

impl SubmissionSink for RelaySink {
    fn submit(&mut self, record: &SubmissionRecord) -> Result<String, String> {
        let body: JSMap<String, JSValue> = record
            .pairs()
            .iter()
            .map(|(k, v)| (k.clone(), JSValue::String(v.clone())))
            .collect();
        let response = match self.agent.post(&self.url).send_json(JSValue::Object(body)) {
            Ok(r) => r,
            // Errors are replied with a status too, the body still says why.
            Err(ureq::Error::Status(code, r)) => {
                debug!("submit: relay answered {}", code);
                r
            }
            Err(e) => {
                warn!("submit: relay unreachable: {}", e);
                return Err(
                    "An error occurred while communicating with the persistence relay."
                        .to_string(),
                );
            }
        };
        let text = response.into_string().map_err(|e| e.to_string())?;
        let id = interpret_reply(&text)?;
        Ok(id
            .or_else(|| record.submission_id().map(|s| s.to_string()))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_must_exceed_the_threshold() {
        let reply = |score| SiteVerifyReply {
            success: true,
            score,
            error_codes: vec![],
        };
        assert!(verdict(&reply(Some(0.9)), 0.5).passed);
        assert!(!verdict(&reply(Some(0.5)), 0.5).passed);
        assert!(!verdict(&reply(Some(0.1)), 0.5).passed);
        assert!(verdict(&reply(None), 0.5).passed);
    }

    #[test]
    fn invalid_tokens_fail() {
        let v = verdict(
            &SiteVerifyReply {
                success: false,
                score: Some(0.9),
                error_codes: vec!["timeout-or-duplicate".to_string()],
            },
            0.5,
        );
        assert!(!v.passed);
        assert_eq!(v.reason.as_deref(), Some("timeout-or-duplicate"));
    }

    #[test]
    fn missing_secret_refuses_without_calling() {
        let mut verifier =
            RecaptchaVerifier::new(build_agent(Duration::from_secs(1)), &RecaptchaSettings {
                endpoint: "http://127.0.0.1:9/never".to_string(),
                ..RecaptchaSettings::default()
            });
        let v = verifier.verify("token", None).expect("no call made");
        assert!(!v.passed);
    }

    #[test]
    fn relay_replies() {
        assert_eq!(
            interpret_reply(r#"{"status":"success","message":"ok","submissionId":"20240305-101530-001"}"#),
            Ok(Some("20240305-101530-001".to_string()))
        );
        assert_eq!(
            interpret_reply(r#"{"status":"success","message":"Data saved and emails sent."}"#),
            Ok(None)
        );
        assert_eq!(
            interpret_reply(r#"{"status":"error","message":"Lock timeout after 30s"}"#),
            Err("Lock timeout after 30s".to_string())
        );
        assert!(interpret_reply("<html>502</html>").is_err());
    }

    #[test]
    fn no_lookup_url_means_unavailable() {
        let agent = build_agent(Duration::from_secs(1));
        assert_eq!(lookup_ip(&agent, None), IP_UNAVAILABLE);
    }
}
