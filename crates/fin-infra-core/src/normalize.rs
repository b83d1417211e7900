//! Merchant name normalization
//!
//! Maps raw statement strings ("NFLX*SUB #12345", "NETFLIX.COM", "Netflix Inc")
//! to one canonical identity ("netflix"). Resolution order:
//!
//! 1. Empty input: the "unknown" sentinel
//! 2. Configured merchant rules, then deterministic cleaning + brand
//!    dictionary (confidence 1.0)
//! 3. Cache read-through, keyed `merchant_norm:<lowercased raw>`
//! 4. LLM, when allowed and within budget; the answer is cached with no TTL
//! 5. The cleaned string itself (confidence 0.5)
//!
//! Cache errors propagate; LLM errors fall through to step 5.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::MerchantCache;
use crate::config::RecurringConfig;
use crate::error::Result;
use crate::gateway::{CostGateway, LlmOutcome};
use crate::llm::{ChatMessage, MerchantNormalization};
use crate::models::{CanonicalMerchant, NormalizationCacheEntry, NormalizationSource};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Canonical value for empty merchant strings
pub const UNKNOWN_MERCHANT: &str = "unknown";

/// Cache key prefix for normalization entries
pub const CACHE_KEY_PREFIX: &str = "merchant_norm:";

/// Confidence of an unrecognized, deterministically cleaned name
const CLEANED_CONFIDENCE: f64 = 0.5;

/// Payment processor and wallet prefixes, lowercase, longest variants first
const PROCESSOR_PREFIXES: &[&str] = &[
    "paypal *", "paypal*", "aplpay ", "applepay ", "apple pay ", "gglpay ", "google *",
    "google*", "sq * ", "sq *", "sq*", "tst* ", "tst*", "sp * ", "sp *", "sp*", "pp*",
    "bt*", "dd *", "dd*", "ic* ", "ic*", "pos ", "ach ", "debit ", "recurring ",
];

/// Trailing legal/locale suffixes dropped during cleaning
const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "corp", "corporation", "co", "company", "usa", "us", "plc", "gmbh",
    "limited",
];

/// Known brands and the aliases that identify them
const BRANDS: &[(&str, &[&str])] = &[
    ("netflix", &["netflix", "nflx"]),
    ("spotify", &["spotify"]),
    ("hulu", &["hulu"]),
    ("disney plus", &["disney plus", "disneyplus", "disney+"]),
    ("youtube", &["youtube", "youtube premium", "youtubepremium"]),
    ("apple", &["apple", "itunes"]),
    ("amazon prime", &["amazon prime", "prime video", "amzn prime"]),
    ("amazon", &["amazon", "amzn", "amzn mktp"]),
    ("starbucks", &["starbucks"]),
    ("at&t", &["at&t", "att"]),
    ("t-mobile", &["t-mobile", "tmobile", "t mobile"]),
    ("verizon", &["verizon", "vzwrlss", "verizon wireless"]),
    ("comcast", &["comcast", "xfinity"]),
    ("planet fitness", &["planet fitness"]),
    ("adobe", &["adobe"]),
    ("microsoft", &["microsoft", "msft"]),
    ("dropbox", &["dropbox"]),
    ("target", &["target"]),
    ("whole foods", &["whole foods", "wholefds"]),
    ("uber", &["uber"]),
];

static STORE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\s*[0-9a-z]*\d[0-9a-z]*").expect("valid regex"));
static DOMAIN_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(com|net|org|io|tv|co)\b(/\S*)?").expect("valid regex"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9&'+\- ]").expect("valid regex"));

/// Normalization counters
#[derive(Debug, Default)]
struct Counters {
    dictionary_hits: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    llm_calls: AtomicU64,
    llm_failures: AtomicU64,
    fallbacks: AtomicU64,
}

/// Snapshot of normalization counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizerStats {
    pub dictionary_hits: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub llm_calls: u64,
    pub llm_failures: u64,
    pub fallbacks: u64,
}

impl NormalizerStats {
    /// Share of cache lookups that hit (0.0 when the cache was never consulted)
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Raw merchant string to canonical identity
pub struct MerchantNormalizer {
    cache: Arc<dyn MerchantCache>,
    gateway: Option<Arc<CostGateway>>,
    prompt: Prompt,
    rules: Vec<(Regex, String)>,
    cost_per_call: Decimal,
    counters: Counters,
}

impl MerchantNormalizer {
    /// Pattern-only normalizer (no LLM fallback)
    pub fn new(cache: Arc<dyn MerchantCache>, config: &RecurringConfig) -> Result<Self> {
        let prompt = PromptLibrary::new().get(PromptId::NormalizeMerchant)?.clone();
        let rules = config
            .merchant_rules
            .iter()
            .map(|rule| Ok((Regex::new(&rule.pattern)?, rule.canonical.to_lowercase())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cache,
            gateway: None,
            prompt,
            rules,
            cost_per_call: config.cost_per_normalization,
            counters: Counters::default(),
        })
    }

    /// Enable the LLM fallback through a cost gateway
    pub fn with_gateway(mut self, gateway: Arc<CostGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn cache(&self) -> &Arc<dyn MerchantCache> {
        &self.cache
    }

    /// Normalize, allowing the LLM fallback if a gateway is configured
    pub async fn normalize(&self, raw: &str) -> Result<CanonicalMerchant> {
        self.normalize_with(raw, true).await
    }

    /// Normalize; `allow_llm = false` keeps this call deterministic + cache only
    pub async fn normalize_with(&self, raw: &str, allow_llm: bool) -> Result<CanonicalMerchant> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CanonicalMerchant {
                name: UNKNOWN_MERCHANT.to_string(),
                confidence: 0.0,
                source: NormalizationSource::Sentinel,
            });
        }

        if let Some((_, canonical)) = self.rules.iter().find(|(re, _)| re.is_match(trimmed)) {
            self.counters.dictionary_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(dictionary(canonical));
        }

        let cleaned = clean_merchant(trimmed);
        if cleaned.is_empty() {
            return Ok(CanonicalMerchant {
                name: UNKNOWN_MERCHANT.to_string(),
                confidence: 0.0,
                source: NormalizationSource::Sentinel,
            });
        }

        if let Some(brand) = lookup_brand(&cleaned) {
            self.counters.dictionary_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(dictionary(brand));
        }

        let key = cache_key(trimmed);
        if let Some(value) = self.cache.get(&key).await? {
            match serde_json::from_str::<NormalizationCacheEntry>(&value) {
                Ok(entry) => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(raw = %trimmed, canonical = %entry.canonical_merchant, "Normalization cache hit");
                    return Ok(CanonicalMerchant {
                        name: entry.canonical_merchant,
                        confidence: entry.confidence,
                        source: NormalizationSource::Cache,
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring unreadable cache entry"),
            }
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        if allow_llm {
            if let Some(ref gateway) = self.gateway {
                if let Some(resolved) = self.ask_llm(gateway, trimmed, &cleaned, &key).await? {
                    return Ok(resolved);
                }
            }
        }

        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        Ok(CanonicalMerchant {
            name: cleaned,
            confidence: CLEANED_CONFIDENCE,
            source: NormalizationSource::Cleaned,
        })
    }

    async fn ask_llm(
        &self,
        gateway: &CostGateway,
        raw: &str,
        cleaned: &str,
        key: &str,
    ) -> Result<Option<CanonicalMerchant>> {
        let vars = HashMap::from([("merchant", raw), ("cleaned", cleaned)]);
        let messages = vec![
            ChatMessage::system(self.prompt.system()),
            ChatMessage::user(self.prompt.render_user(&vars)),
        ];

        let answer = match gateway
            .chat_structured::<MerchantNormalization>(messages, self.cost_per_call)
            .await
        {
            LlmOutcome::Completed(answer) => answer,
            LlmOutcome::BudgetExceeded => return Ok(None),
            LlmOutcome::Failed(reason) => {
                self.counters.llm_failures.fetch_add(1, Ordering::Relaxed);
                debug!(raw = %raw, reason = %reason, "LLM normalization failed, using cleaned name");
                return Ok(None);
            }
        };
        self.counters.llm_calls.fetch_add(1, Ordering::Relaxed);

        let canonical = answer.canonical_name.trim().to_lowercase();
        let entry = NormalizationCacheEntry {
            raw_merchant_key: raw.to_lowercase(),
            canonical_merchant: canonical.clone(),
            confidence: answer.confidence,
            normalized_at: Utc::now(),
        };
        self.cache
            .set(key, &serde_json::to_string(&entry)?, None)
            .await?;

        debug!(raw = %raw, canonical = %canonical, "LLM normalized merchant");
        Ok(Some(CanonicalMerchant {
            name: canonical,
            confidence: answer.confidence,
            source: NormalizationSource::Llm,
        }))
    }

    pub fn stats(&self) -> NormalizerStats {
        let c = &self.counters;
        NormalizerStats {
            dictionary_hits: c.dictionary_hits.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            llm_calls: c.llm_calls.load(Ordering::Relaxed),
            llm_failures: c.llm_failures.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
        }
    }
}

fn dictionary(name: &str) -> CanonicalMerchant {
    CanonicalMerchant {
        name: name.to_string(),
        confidence: 1.0,
        source: NormalizationSource::Dictionary,
    }
}

/// Case-insensitive cache key for a raw merchant string
pub fn cache_key(raw: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, raw.trim().to_lowercase())
}

/// Deterministic cleanup of a raw merchant string
///
/// Lowercases, strips processor prefixes, store numbers, reference codes,
/// domain and legal suffixes, and collapses whitespace.
pub fn clean_merchant(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();

    // Wallet + processor can stack ("aplpay sq *coffee")
    loop {
        let before = s.len();
        for prefix in PROCESSOR_PREFIXES {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest.trim_start().to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }

    let s = DOMAIN_SUFFIX.replace_all(&s, " ");
    let s = STORE_NUMBER.replace_all(&s, " ");
    let s = s.replace('*', " ");
    let s = PUNCTUATION.replace_all(&s, " ");

    let words: Vec<&str> = s.split_whitespace().collect();
    let mut tokens: Vec<&str> = words
        .iter()
        .enumerate()
        .filter(|(i, token)| {
            (*i == 0 && words.len() > 1 && is_leading_brand_number(token))
                || !is_reference_code(token)
        })
        .map(|(_, token)| *token)
        .collect();

    while tokens.len() > 1 && tokens.last().is_some_and(|t| LEGAL_SUFFIXES.contains(t)) {
        tokens.pop();
    }

    tokens.join(" ")
}

/// Pure numbers and digit-heavy codes ("12345", "x7k2m9q") carry no identity
fn is_reference_code(token: &str) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    digits == token.chars().count() || (token.len() >= 5 && digits >= 2)
}

/// Short number opening a name ("24 hour fitness", "99 ranch market")
fn is_leading_brand_number(token: &str) -> bool {
    token.len() <= 3 && token.chars().all(|c| c.is_ascii_digit())
}

/// Longest brand alias equal to, or leading, the cleaned name
fn lookup_brand(cleaned: &str) -> Option<&'static str> {
    BRANDS
        .iter()
        .flat_map(|(canonical, aliases)| aliases.iter().map(move |alias| (*canonical, *alias)))
        .filter(|(_, alias)| {
            cleaned == *alias
                || cleaned
                    .strip_prefix(alias)
                    .is_some_and(|rest| rest.starts_with(' '))
        })
        .max_by_key(|(_, alias)| alias.len())
        .map(|(canonical, _)| canonical)
}
