//! Gateway / prescanner hit classification.
//!
//! Email security gateways and link prescanners fetch tracking pixels and
//! follow links before (or instead of) the human recipient. A hit is
//! classified as automated when either signal matches:
//!
//! - **User-Agent**: case-insensitive substring match against a signature
//!   list.
//! - **Source IP**: membership in a list of CIDR blocks known to host
//!   scanning infrastructure.
//!
//! Both lists are data. A [`GatewayClassifier`] is built once from a
//! [`ClassifierConfig`] and is read-only afterwards, so a single instance
//! can be shared across request handlers without locking.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::cidr::CidrBlock;
use crate::error::ClassifierError;
use crate::event::InteractionDetails;

/// Decides whether a hit came from automated infrastructure.
pub trait HitClassifier: Send + Sync {
    /// True if the hit looks like a gateway or prescanner rather than a human.
    ///
    /// Must never fail: unparseable or empty input evaluates to "no match".
    fn is_gateway_hit(&self, source_ip: &str, user_agent: &str) -> bool;

    /// Classify the browser metadata of an interaction.
    fn classify(&self, details: &InteractionDetails) -> bool {
        self.is_gateway_hit(&details.browser.address, &details.browser.user_agent)
    }
}

/// Signature and CIDR lists for a [`GatewayClassifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Substrings seen in gateway User-Agents (matched case-insensitively).
    pub user_agent_signatures: Vec<String>,
    /// CIDR blocks hosting scanners. Broad cloud ranges are expected here,
    /// since hosted scanners rotate addresses inside them.
    pub cidr_blocks: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            user_agent_signatures: [
                "GoogleImageProxy",
                "ms-office-web",
                "Proofpoint",
                "Mimecast",
                "Microsoft-Exchange-Transport",
                "Linux x86_64) AppleWebKit",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cidr_blocks: ["66.249.84.0/24", "34.0.0.0/8", "35.0.0.0/8", "54.0.0.0/8"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Which signals matched a hit. Both may match at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayMatch {
    /// The configured signature found in the User-Agent.
    pub user_agent_signature: Option<String>,
    /// The configured block containing the source IP.
    pub cidr_block: Option<CidrBlock>,
}

impl GatewayMatch {
    pub fn is_gateway(&self) -> bool {
        self.user_agent_signature.is_some() || self.cidr_block.is_some()
    }
}

/// Classifier over a fixed signature list and a fixed set of CIDR blocks.
#[derive(Debug, Clone)]
pub struct GatewayClassifier {
    /// (original, lowercased) pairs; lowercased once at construction.
    signatures: Vec<(String, String)>,
    blocks: Vec<CidrBlock>,
}

impl GatewayClassifier {
    /// Build a classifier, validating every configured entry.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let mut signatures = Vec::with_capacity(config.user_agent_signatures.len());
        for (index, sig) in config.user_agent_signatures.iter().enumerate() {
            if sig.trim().is_empty() {
                return Err(ClassifierError::EmptySignature { index });
            }
            signatures.push((sig.clone(), sig.to_lowercase()));
        }
        let blocks = config
            .cidr_blocks
            .iter()
            .map(|c| c.parse::<CidrBlock>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { signatures, blocks })
    }

    /// A classifier with no signatures and no blocks; matches nothing.
    pub fn empty() -> Self {
        Self {
            signatures: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Evaluate both signals independently and report what matched.
    pub fn evaluate(&self, source_ip: &str, user_agent: &str) -> GatewayMatch {
        GatewayMatch {
            user_agent_signature: self.match_user_agent(user_agent).map(str::to_string),
            cidr_block: self.match_ip(source_ip),
        }
    }

    fn match_user_agent(&self, user_agent: &str) -> Option<&str> {
        if user_agent.is_empty() {
            return None;
        }
        let lowered = user_agent.to_lowercase();
        self.signatures
            .iter()
            .find(|(_, lower)| lowered.contains(lower.as_str()))
            .map(|(original, _)| original.as_str())
    }

    fn match_ip(&self, source_ip: &str) -> Option<CidrBlock> {
        let ip: IpAddr = source_ip.trim().parse().ok()?;
        self.blocks.iter().copied().find(|block| block.contains(ip))
    }
}

impl Default for GatewayClassifier {
    fn default() -> Self {
        // The built-in lists are static and known to parse.
        match Self::from_config(&ClassifierConfig::default()) {
            Ok(classifier) => classifier,
            Err(_) => Self::empty(),
        }
    }
}

impl HitClassifier for GatewayClassifier {
    fn is_gateway_hit(&self, source_ip: &str, user_agent: &str) -> bool {
        self.match_user_agent(user_agent).is_some() || self.match_ip(source_ip).is_some()
    }
}

/// Classifier that never flags a hit. Used to disable screening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClassifier;

impl HitClassifier for NoopClassifier {
    fn is_gateway_hit(&self, _source_ip: &str, _user_agent: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn classifier() -> GatewayClassifier {
        GatewayClassifier::default()
    }

    #[test]
    fn default_config_parses() {
        let c = GatewayClassifier::from_config(&ClassifierConfig::default()).unwrap();
        assert_eq!(c.signature_count(), 6);
        assert_eq!(c.block_count(), 4);
    }

    #[test]
    fn signature_matches_in_any_case() {
        let c = classifier();
        for ua in [
            "GoogleImageProxy",
            "googleimageproxy",
            "Mozilla/5.0 (Windows NT 5.1; rv:11.0) Gecko Firefox/11.0 (via ggpht.com GOOGLEIMAGEPROXY)",
            "mImEcAsT url defense",
            "Microsoft-Exchange-Transport/15.0",
        ] {
            assert!(c.is_gateway_hit("", ua), "missed {ua:?}");
        }
    }

    #[test]
    fn ordinary_browser_is_not_flagged() {
        let c = classifier();
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
        assert!(!c.is_gateway_hit("203.0.113.10", ua));
    }

    #[test]
    fn ip_inside_block_is_flagged() {
        let c = classifier();
        assert!(c.is_gateway_hit("66.249.84.10", ""));
        assert!(c.is_gateway_hit("54.239.28.85", "Mozilla/5.0"));
        assert!(c.is_gateway_hit(" 35.1.1.1 ", ""));
    }

    #[test]
    fn ip_outside_blocks_is_not_flagged() {
        let c = classifier();
        assert!(!c.is_gateway_hit("66.249.85.10", ""));
        assert!(!c.is_gateway_hit("198.51.100.4", ""));
    }

    #[test]
    fn unparseable_ip_degrades_to_no_match() {
        let c = classifier();
        assert!(!c.is_gateway_hit("not-an-ip", ""));
        assert!(!c.is_gateway_hit("66.249.84.10:443", ""));
        assert!(!c.is_gateway_hit("999.1.1.1", ""));
        // UA signal still evaluated
        assert!(c.is_gateway_hit("garbage", "Proofpoint URL Defense"));
    }

    #[test]
    fn empty_inputs_return_false() {
        assert!(!classifier().is_gateway_hit("", ""));
        assert!(!GatewayClassifier::empty().is_gateway_hit("66.249.84.10", "GoogleImageProxy"));
    }

    #[test]
    fn evaluate_reports_both_signals() {
        let m = classifier().evaluate("66.249.84.10", "GoogleImageProxy");
        assert_eq!(m.user_agent_signature.as_deref(), Some("GoogleImageProxy"));
        assert_eq!(m.cidr_block.unwrap().to_string(), "66.249.84.0/24");
        assert!(m.is_gateway());

        let none = classifier().evaluate("198.51.100.4", "curl/8.0");
        assert!(!none.is_gateway());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad_cidr = ClassifierConfig {
            user_agent_signatures: vec![],
            cidr_blocks: vec!["34.0.0.0/40".into()],
        };
        assert!(matches!(
            GatewayClassifier::from_config(&bad_cidr),
            Err(ClassifierError::InvalidCidr { .. })
        ));

        let empty_sig = ClassifierConfig {
            user_agent_signatures: vec!["Mimecast".into(), "  ".into()],
            cidr_blocks: vec![],
        };
        assert_eq!(
            GatewayClassifier::from_config(&empty_sig).unwrap_err(),
            ClassifierError::EmptySignature { index: 1 }
        );
    }

    #[test]
    fn classify_reads_browser_metadata() {
        let details = InteractionDetails::new("66.249.84.10", "GoogleImageProxy");
        assert!(classifier().classify(&details));
        assert!(!NoopClassifier.classify(&details));
    }

    #[test]
    fn shared_across_threads() {
        let c: Arc<dyn HitClassifier> = Arc::new(classifier());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    let ip = format!("66.249.84.{i}");
                    c.is_gateway_hit(&ip, "") && !c.is_gateway_hit("198.51.100.1", "")
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
