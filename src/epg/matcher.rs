//! EPG matcher
//!
//! Decides, per channel, which EPG identity it should carry. The decision is
//! pure: nothing here touches storage. Each unlocked channel goes through
//! exclusion rules, then weighted pattern rules, then fuzzy name matching,
//! and the resulting field changes are returned for the caller to commit.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use super::normalize::normalize;
use super::pattern::{is_excluded_by, score_pattern};
use super::similarity;
use crate::config::EpgConfig;
use crate::models::{Channel, EpgEntry, EpgFieldUpdate, EpgFields, PatternMapping};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Leave channels that already carry EPG data alone
    pub respect_existing: bool,
    /// Clear EPG data of channels nothing matched
    pub clean_unmatched: bool,
    pub threshold: f64,
    pub prefix_bonus: f64,
}

impl From<&EpgConfig> for MatchOptions {
    fn from(config: &EpgConfig) -> Self {
        Self {
            respect_existing: config.respect_existing,
            clean_unmatched: config.clean_unmatched,
            threshold: config.match_threshold,
            prefix_bonus: config.prefix_bonus,
        }
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::from(&EpgConfig::default())
    }
}

/// Aggregate counters of one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub total: usize,
    /// Matched and at least one field changed
    pub updated: usize,
    /// Matched but every field already held the applied value
    pub unchanged: usize,
    pub locked: usize,
    pub excluded: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Locked,
    Excluded { pattern: String },
    /// Has EPG data and `respect_existing` is set
    KeptExisting,
    Pattern { epg_id: String, score: u32 },
    Fuzzy { epg_id: String, similarity: f64 },
    Cleaned,
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub stats: ReconcileStats,
    /// Field changes to commit, protected channels never appear here
    pub updates: Vec<EpgFieldUpdate>,
    pub decisions: Vec<(String, MatchDecision)>,
}

/// A fuzzy candidate offered for manual review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub epg_id: String,
    pub name: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub channel_id: String,
    pub channel_name: String,
    pub candidates: Vec<Candidate>,
}

pub struct EpgMatcher {
    options: MatchOptions,
    entries: BTreeMap<String, EpgEntry>,
    /// (epg_id, normalized name) in epg_id order
    normalized: Vec<(String, String)>,
}

impl EpgMatcher {
    /// Index EPG entries by id. Later entries replace earlier ones with the same id.
    pub fn new<I>(entries: I, options: MatchOptions) -> Self
    where
        I: IntoIterator<Item = EpgEntry>,
    {
        let entries: BTreeMap<String, EpgEntry> = entries
            .into_iter()
            .map(|entry| (entry.epg_id.clone(), entry))
            .collect();
        let normalized = entries
            .values()
            .map(|entry| (entry.epg_id.clone(), normalize(&entry.name)))
            .filter(|(_, name)| !name.is_empty())
            .collect();

        Self {
            options,
            entries,
            normalized,
        }
    }

    pub fn reconcile(&self, channels: &[Channel], mappings: &[PatternMapping]) -> ReconcileOutcome {
        let (exclusions, inclusions): (Vec<&PatternMapping>, Vec<&PatternMapping>) =
            mappings.iter().partition(|m| m.is_exclusion());
        // Rules pointing at ids absent from this refresh can never apply
        let inclusions: Vec<&PatternMapping> = inclusions
            .into_iter()
            .filter(|m| {
                m.target_epg_id
                    .as_ref()
                    .is_some_and(|id| self.entries.contains_key(id))
            })
            .collect();

        let mut stats = ReconcileStats {
            total: channels.len(),
            ..Default::default()
        };
        let mut updates = Vec::new();
        let mut decisions = Vec::with_capacity(channels.len());

        for channel in channels {
            let decision = match self.decide(channel, &exclusions, &inclusions) {
                Ok(decision) => decision,
                Err(reason) => {
                    warn!("Skipping channel {} during EPG reconcile: {}", channel.id, reason);
                    stats.errors += 1;
                    continue;
                }
            };

            let target = match &decision {
                MatchDecision::Locked => {
                    stats.locked += 1;
                    None
                }
                MatchDecision::Excluded { .. } => {
                    stats.excluded += 1;
                    Some(EpgFields::cleared())
                }
                MatchDecision::KeptExisting | MatchDecision::NoMatch => {
                    stats.skipped += 1;
                    None
                }
                MatchDecision::Cleaned => {
                    stats.cleaned += 1;
                    Some(EpgFields::cleared())
                }
                MatchDecision::Pattern { epg_id, .. } | MatchDecision::Fuzzy { epg_id, .. } => {
                    let fields = self.fields_for(channel, epg_id);
                    if fields == channel.epg_fields() {
                        stats.unchanged += 1;
                    } else {
                        stats.updated += 1;
                    }
                    Some(fields)
                }
            };

            if let Some(fields) = target {
                if fields != channel.epg_fields() {
                    updates.push(EpgFieldUpdate {
                        channel_id: channel.id.clone(),
                        fields,
                    });
                }
            }

            trace!("EPG decision for {} ({}): {:?}", channel.id, channel.name, decision);
            decisions.push((channel.id.clone(), decision));
        }

        debug!(
            "Reconciled {} channels: {} updated, {} unchanged, {} locked, {} excluded, {} cleaned, {} skipped, {} errors",
            stats.total,
            stats.updated,
            stats.unchanged,
            stats.locked,
            stats.excluded,
            stats.cleaned,
            stats.skipped,
            stats.errors
        );

        ReconcileOutcome {
            stats,
            updates,
            decisions,
        }
    }

    fn decide(
        &self,
        channel: &Channel,
        exclusions: &[&PatternMapping],
        inclusions: &[&PatternMapping],
    ) -> Result<MatchDecision, String> {
        if channel.epg_update_protected {
            return Ok(MatchDecision::Locked);
        }
        if channel.name.trim().is_empty() {
            return Err("channel has no name".to_string());
        }

        if let Some(rule) = exclusions.iter().find(|m| is_excluded_by(m, &channel.name)) {
            return Ok(MatchDecision::Excluded {
                pattern: rule.search_pattern.clone(),
            });
        }

        if self.options.respect_existing && channel.has_epg_data() {
            return Ok(MatchDecision::KeptExisting);
        }

        if let Some((epg_id, score)) = best_pattern(inclusions, &channel.name) {
            return Ok(MatchDecision::Pattern { epg_id, score });
        }

        if let Some((entry, similarity)) = self.best_fuzzy(&channel.name) {
            return Ok(MatchDecision::Fuzzy {
                epg_id: entry.epg_id.clone(),
                similarity,
            });
        }

        if self.options.clean_unmatched && channel.has_epg_data() {
            Ok(MatchDecision::Cleaned)
        } else {
            Ok(MatchDecision::NoMatch)
        }
    }

    /// Overwrite policy: every non-empty value of the entry replaces the channel's
    fn fields_for(&self, channel: &Channel, epg_id: &str) -> EpgFields {
        let mut fields = channel.epg_fields();
        if let Some(entry) = self.entries.get(epg_id) {
            fields.tvg_id = Some(entry.epg_id.clone());
            if !entry.name.trim().is_empty() {
                fields.tvg_name = Some(entry.name.clone());
            }
            if let Some(logo) = entry.logo.as_ref().filter(|l| !l.trim().is_empty()) {
                fields.logo = Some(logo.clone());
            }
        }
        fields
    }

    /// Highest scoring entry at or above the threshold. Ties keep the smallest id.
    pub fn best_fuzzy(&self, channel_name: &str) -> Option<(&EpgEntry, f64)> {
        let name = normalize(channel_name);
        if name.is_empty() {
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for (epg_id, candidate) in &self.normalized {
            let similarity = similarity::score(&name, candidate, self.options.prefix_bonus);
            if similarity >= self.options.threshold
                && best.map_or(true, |(_, current)| similarity > current)
            {
                best = Some((epg_id.as_str(), similarity));
            }
        }

        best.and_then(|(epg_id, similarity)| {
            self.entries.get(epg_id).map(|entry| (entry, similarity))
        })
    }

    /// Fuzzy candidates for every unlocked, named channel, best first.
    /// Nothing is applied.
    pub fn suggest(&self, channels: &[Channel], limit: usize) -> Vec<Suggestion> {
        channels
            .iter()
            .filter(|c| !c.epg_update_protected && !c.name.trim().is_empty())
            .filter_map(|channel| {
                let name = normalize(&channel.name);
                if name.is_empty() {
                    return None;
                }

                let mut candidates: Vec<Candidate> = self
                    .normalized
                    .iter()
                    .filter_map(|(epg_id, candidate)| {
                        let similarity =
                            similarity::score(&name, candidate, self.options.prefix_bonus);
                        (similarity >= self.options.threshold).then(|| Candidate {
                            epg_id: epg_id.clone(),
                            name: self
                                .entries
                                .get(epg_id)
                                .map(|e| e.name.clone())
                                .unwrap_or_default(),
                            similarity,
                        })
                    })
                    .collect();
                if candidates.is_empty() {
                    return None;
                }

                // Stable sort keeps epg_id order among equal scores
                candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
                candidates.truncate(limit.max(1));

                Some(Suggestion {
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    candidates,
                })
            })
            .collect()
    }
}

/// Highest scoring inclusion rule for the name. Ties keep the earlier rule.
fn best_pattern(inclusions: &[&PatternMapping], channel_name: &str) -> Option<(String, u32)> {
    let mut best: Option<(&PatternMapping, u32)> = None;
    for mapping in inclusions {
        if let Some(score) = score_pattern(mapping.needle(), channel_name) {
            if best.map_or(true, |(_, current)| score > current) {
                best = Some((*mapping, score));
            }
        }
    }
    best.and_then(|(mapping, score)| mapping.target_epg_id.clone().map(|id| (id, score)))
}

/// Run one reconcile pass over `channels`
pub fn reconcile(
    channels: &[Channel],
    mappings: &[PatternMapping],
    entries: impl IntoIterator<Item = EpgEntry>,
    options: MatchOptions,
) -> ReconcileOutcome {
    EpgMatcher::new(entries, options).reconcile(channels, mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str, logo: Option<&str>) -> EpgEntry {
        EpgEntry {
            epg_id: id.to_string(),
            name: name.to_string(),
            logo: logo.map(str::to_string),
            source_id: 1,
        }
    }

    fn mapping(id: i64, pattern: &str, target: Option<&str>) -> PatternMapping {
        PatternMapping {
            id,
            search_pattern: pattern.to_string(),
            target_epg_id: target.map(str::to_string),
        }
    }

    fn entries() -> Vec<EpgEntry> {
        vec![
            entry("espn.us", "ESPN", Some("http://logos/espn.png")),
            entry("espn2.us", "ESPN 2", Some("http://logos/espn2.png")),
            entry("sky.sports.main", "Sky Sports Main Event", None),
            entry("dazn.f1", "DAZN F1", Some("http://logos/dazn.png")),
        ]
    }

    #[test]
    fn test_more_specific_pattern_is_applied() {
        let channels = vec![Channel::new("c1", "ESPN 2 HD")];
        let mappings = vec![
            mapping(1, "ESPN", Some("espn.us")),
            mapping(2, "ESPN 2", Some("espn2.us")),
        ];

        let outcome = reconcile(&channels, &mappings, entries(), MatchOptions::default());

        assert_eq!(outcome.stats.updated, 1);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].fields.tvg_id.as_deref(), Some("espn2.us"));
        assert_eq!(outcome.updates[0].fields.tvg_name.as_deref(), Some("ESPN 2"));
        assert!(matches!(
            &outcome.decisions[0].1,
            MatchDecision::Pattern { epg_id, score: 8_860 } if epg_id == "espn2.us"
        ));
    }

    #[test]
    fn test_exclusion_wins_and_clears() {
        let mut channel = Channel::new("c1", "ESPN 2 Adult HD");
        channel.tvg_id = Some("espn2.us".to_string());
        channel.logo = Some("http://logos/espn2.png".to_string());
        let mappings = vec![
            mapping(1, "ESPN 2", Some("espn2.us")),
            mapping(2, "!adult", None),
        ];

        let outcome = reconcile(&[channel], &mappings, entries(), MatchOptions::default());

        assert_eq!(outcome.stats.excluded, 1);
        assert_eq!(outcome.stats.updated, 0);
        assert_eq!(outcome.updates[0].fields, EpgFields::cleared());
    }

    #[test]
    fn test_locked_channels_are_untouched() {
        let mut channel = Channel::new("c1", "ESPN 2");
        channel.epg_update_protected = true;
        channel.tvg_id = Some("manual.id".to_string());
        let mappings = vec![mapping(1, "!espn", None)];

        let outcome = reconcile(&[channel], &mappings, entries(), MatchOptions::default());

        assert_eq!(outcome.stats.locked, 1);
        assert_eq!(outcome.stats.total, 1);
        assert!(outcome.updates.is_empty());
    }

    #[test]
    fn test_fuzzy_fallback() {
        let channels = vec![Channel::new("c1", "Sky Sports Main Event FHD (EN)")];
        let outcome = reconcile(&channels, &[], entries(), MatchOptions::default());

        assert_eq!(outcome.stats.updated, 1);
        let fields = &outcome.updates[0].fields;
        assert_eq!(fields.tvg_id.as_deref(), Some("sky.sports.main"));
        assert_eq!(fields.logo, None);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let mut channels = vec![
            Channel::new("c1", "ESPN 2 HD"),
            Channel::new("c2", "DAZN F1 1080p"),
            Channel::new("c3", "Completely Unknown"),
        ];
        let mappings = vec![mapping(1, "ESPN 2", Some("espn2.us"))];

        let first = reconcile(&channels, &mappings, entries(), MatchOptions::default());
        assert_eq!(first.stats.updated, 2);
        assert_eq!(first.stats.skipped, 1);

        for update in &first.updates {
            let channel = channels
                .iter_mut()
                .find(|c| c.id == update.channel_id)
                .unwrap();
            channel.tvg_id = update.fields.tvg_id.clone();
            channel.tvg_name = update.fields.tvg_name.clone();
            channel.logo = update.fields.logo.clone();
        }

        let second = reconcile(&channels, &mappings, entries(), MatchOptions::default());
        assert_eq!(second.stats.updated, 0);
        assert_eq!(second.stats.unchanged, 2);
        assert!(second.updates.is_empty());
    }

    #[test]
    fn test_respect_existing_and_clean_unmatched() {
        let mut tagged = Channel::new("c1", "ESPN 2");
        tagged.tvg_id = Some("legacy".to_string());
        let mut orphan = Channel::new("c2", "Nothing Like It");
        orphan.tvg_name = Some("Old".to_string());

        let options = MatchOptions {
            respect_existing: true,
            clean_unmatched: true,
            ..MatchOptions::default()
        };
        let outcome = reconcile(&[tagged.clone(), orphan.clone()], &[], entries(), options);
        // Both carry EPG data, so neither is considered for matching or cleaning
        assert_eq!(outcome.stats.skipped, 2);
        assert_eq!(outcome.stats.cleaned, 0);
        assert!(outcome.updates.is_empty());

        let options = MatchOptions {
            respect_existing: false,
            clean_unmatched: true,
            ..MatchOptions::default()
        };
        let outcome = reconcile(&[orphan], &[], entries(), options);
        assert_eq!(outcome.stats.cleaned, 1);
        assert_eq!(outcome.updates[0].fields, EpgFields::cleared());
    }

    #[test]
    fn test_pattern_with_unknown_target_falls_through() {
        let channels = vec![Channel::new("c1", "DAZN F1")];
        let mappings = vec![mapping(1, "DAZN", Some("missing.id"))];
        let outcome = reconcile(&channels, &mappings, entries(), MatchOptions::default());

        assert!(matches!(
            &outcome.decisions[0].1,
            MatchDecision::Fuzzy { epg_id, .. } if epg_id == "dazn.f1"
        ));
    }

    #[test]
    fn test_nameless_channel_counts_as_error() {
        let channels = vec![Channel::new("c1", "  "), Channel::new("c2", "ESPN")];
        let outcome = reconcile(&channels, &[], entries(), MatchOptions::default());
        assert_eq!(outcome.stats.errors, 1);
        assert_eq!(outcome.stats.total, 2);
        assert_eq!(outcome.stats.updated, 1);
    }

    #[test]
    fn test_suggest_skips_locked_channels() {
        let mut locked = Channel::new("c1", "ESPN 2");
        locked.epg_update_protected = true;
        let open = Channel::new("c2", "ESPN 2 HD");

        let matcher = EpgMatcher::new(entries(), MatchOptions::default());
        let suggestions = matcher.suggest(&[locked, open], 3);

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].channel_id, "c2");
        assert_eq!(suggestions[0].candidates[0].epg_id, "espn2.us");
    }
}
