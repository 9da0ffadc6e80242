//! Minimal robots.txt parser.
//!
//! Supports `User-agent`, `Disallow` and `Allow` with plain prefix matching.
//! Only the most specific matching group applies: a group naming the crawler
//! beats `*`, and `*` is consulted only when no named group matches. Within
//! the chosen group rules run in file order, so a later `Allow` overrides an
//! earlier matching `Disallow`.

/// A single path rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsRule {
    Allow(String),
    Disallow(String),
}

/// A block of rules shared by one or more consecutive `User-agent` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AgentGroup {
    agents: Vec<String>,
    rules: Vec<RobotsRule>,
}

impl AgentGroup {
    /// Names the crawler explicitly. `ua` must already be lowercase.
    fn names(&self, ua: &str) -> bool {
        self.agents
            .iter()
            .any(|agent| agent != "*" && !agent.is_empty() && ua.contains(agent.as_str()))
    }

    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|agent| agent == "*")
    }
}

/// Parsed robots.txt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    groups: Vec<AgentGroup>,
}

impl RobotsRules {
    /// Parse robots.txt text. Never fails: unknown directives and junk lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<AgentGroup> = Vec::new();
        let mut current: Option<AgentGroup> = None;
        // A User-agent line right after another one extends the same group.
        let mut last_was_agent = false;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    let agent = value.to_ascii_lowercase();
                    match current.as_mut() {
                        Some(group) if last_was_agent => group.agents.push(agent),
                        _ => {
                            if let Some(done) = current.take() {
                                groups.push(done);
                            }
                            current = Some(AgentGroup {
                                agents: vec![agent],
                                rules: Vec::new(),
                            });
                        }
                    }
                    last_was_agent = true;
                }
                "disallow" | "allow" => {
                    last_was_agent = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    if value.is_empty() {
                        // `Disallow:` with no path allows everything.
                        continue;
                    }
                    let rule = if key == "allow" {
                        RobotsRule::Allow(value.to_string())
                    } else {
                        RobotsRule::Disallow(value.to_string())
                    };
                    group.rules.push(rule);
                }
                _ => last_was_agent = false,
            }
        }

        if let Some(done) = current {
            groups.push(done);
        }

        Self { groups }
    }

    /// Whether `path` may be fetched by `user_agent`.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let ua = user_agent.to_ascii_lowercase();
        let named: Vec<&AgentGroup> = self.groups.iter().filter(|g| g.names(&ua)).collect();
        let chosen = if named.is_empty() {
            self.groups.iter().filter(|g| g.is_wildcard()).collect()
        } else {
            named
        };

        let mut allowed = true;
        for group in chosen {
            for rule in &group.rules {
                match rule {
                    RobotsRule::Disallow(prefix) if path.starts_with(prefix.as_str()) => {
                        allowed = false;
                    }
                    RobotsRule::Allow(prefix) if path.starts_with(prefix.as_str()) => {
                        allowed = true;
                    }
                    _ => {}
                }
            }
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "GovSnap/0.1 (+public-sector ingestion)";

    #[test]
    fn disallow_prefix_blocks() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /private/\n");
        assert!(!rules.is_allowed("/private/page", UA));
        assert!(rules.is_allowed("/public/page", UA));
    }

    #[test]
    fn later_allow_overrides_disallow() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /records/\nAllow: /records/open/\n",
        );
        assert!(!rules.is_allowed("/records/sealed", UA));
        assert!(rules.is_allowed("/records/open/minutes", UA));
    }

    #[test]
    fn directives_are_case_insensitive() {
        let rules = RobotsRules::parse("USER-AGENT: *\nDISALLOW: /x\n");
        assert!(!rules.is_allowed("/x/y", UA));
    }

    #[test]
    fn literal_agent_matches_substring_of_user_agent() {
        let rules = RobotsRules::parse(
            "User-agent: govsnap\nDisallow: /\n\nUser-agent: otherbot\nDisallow: /nothing\n",
        );
        assert!(!rules.is_allowed("/anything", UA));
        assert!(rules.is_allowed("/anything", "SomeOtherCrawler/1.0"));
    }

    #[test]
    fn consecutive_agents_share_rules() {
        let rules = RobotsRules::parse(
            "User-agent: alpha\nUser-agent: govsnap\nDisallow: /shared\n",
        );
        assert!(!rules.is_allowed("/shared/doc", UA));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n");
        assert!(rules.is_allowed("/anything", UA));
    }

    #[test]
    fn comments_and_junk_are_ignored() {
        let rules = RobotsRules::parse(
            "# comment\nnot a directive\nSitemap: https://x.test/sitemap.xml\nUser-agent: * # all\nDisallow: /tmp # scratch\n",
        );
        assert!(!rules.is_allowed("/tmp/a", UA));
        assert!(rules.is_allowed("/sitemap.xml", UA));
    }

    #[test]
    fn empty_file_allows() {
        let rules = RobotsRules::parse("");
        assert!(rules.is_allowed("/", UA));
    }

    #[test]
    fn named_group_beats_wildcard_in_either_order() {
        let agent_first =
            RobotsRules::parse("User-agent: govsnap\nAllow: /\n\nUser-agent: *\nDisallow: /\n");
        let star_first =
            RobotsRules::parse("User-agent: *\nDisallow: /\n\nUser-agent: govsnap\nAllow: /\n");

        for rules in [&agent_first, &star_first] {
            assert!(rules.is_allowed("/notices/hearing", UA));
            assert!(!rules.is_allowed("/notices/hearing", "OtherBot/2.0"));
        }
    }

    #[test]
    fn wildcard_rules_do_not_leak_into_named_group() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /drafts/\n\nUser-agent: govsnap\nDisallow: /admin/\n",
        );
        assert!(rules.is_allowed("/drafts/budget", UA));
        assert!(!rules.is_allowed("/admin/users", UA));
        assert!(!rules.is_allowed("/drafts/budget", "OtherBot/2.0"));
    }
}
