//! Mailbox name filtering.
//!
//! Combines the user's include/exclude expressions with a fixed catalogue of
//! localized special-folder names (Trash/Junk/Drafts/Sent classes).

use regex::Regex;

use crate::error::FerryResult;

const TRASH_PATTERN: &str = r"(?i)^(Trash|Gelöscht.*|Deleted Items|Papierkorb)$";
const JUNK_PATTERN: &str = r"(?i)^(Junk|Spam|Bulk Mail|Unerw.*)$";
const DRAFTS_PATTERN: &str = r"(?i)^(Drafts|Entwürfe)$";
const SENT_PATTERN: &str = r"(?i)^(Sent( Items)?|Gesendet.*)$";

/// Which special-folder classes to skip. `special` enables all four.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipFlags {
    pub special: bool,
    pub trash: bool,
    pub junk: bool,
    pub drafts: bool,
    pub sent: bool,
}

#[derive(Debug)]
pub struct MailboxFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    special: Option<Regex>,
}

impl MailboxFilter {
    pub fn new(
        include: Option<&str>,
        exclude: Option<&str>,
        skip: SkipFlags,
    ) -> FerryResult<MailboxFilter> {
        let include = include.map(Regex::new).transpose()?;
        let exclude = exclude.map(Regex::new).transpose()?;

        let mut patterns = Vec::new();
        if skip.special || skip.trash {
            patterns.push(TRASH_PATTERN);
        }
        if skip.special || skip.junk {
            patterns.push(JUNK_PATTERN);
        }
        if skip.special || skip.drafts {
            patterns.push(DRAFTS_PATTERN);
        }
        if skip.special || skip.sent {
            patterns.push(SENT_PATTERN);
        }
        let special = if patterns.is_empty() {
            None
        } else {
            Some(Regex::new(&patterns.join("|"))?)
        };

        Ok(MailboxFilter {
            include,
            exclude,
            special,
        })
    }

    /// A name passes iff include matches (or is absent) and neither exclude
    /// nor the special catalogue matches.
    pub fn matches(&self, name: &str) -> bool {
        if let Some(inc) = &self.include {
            if !inc.is_match(name) {
                return false;
            }
        }
        if let Some(exc) = &self.exclude {
            if exc.is_match(name) {
                return false;
            }
        }
        if let Some(special) = &self.special {
            if special.is_match(name) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| self.matches(n))
            .cloned()
            .collect()
    }
}
