//! Heuristic transaction categorizer
//!
//! A priority-ordered rule table evaluated top to bottom, first match wins.
//! The order of [`Categorizer::new`] is the single reviewable artifact for
//! rule precedence. Deterministic and side-effect free.
//!
//! The categorizer never assigns `InternalTransfer`; the pipeline overrides
//! the category of reconciled transfer legs as an explicit post-processing
//! step.

use regex::Regex;

use crate::types::{
    CategorizationResult, Category, Direction, StatementError, StatementResult,
};

const CONFIDENCE_VENDOR: f64 = 0.95;
const CONFIDENCE_STRONG: f64 = 0.90;
const CONFIDENCE_WEAK: f64 = 0.70;
const CONFIDENCE_FALLBACK: f64 = 0.40;

/// Known vendor names, matched as substrings of the normalized text
const VENDOR_ACCOUNTANT: &[&str] = &["optimar consult expert"];
const VENDOR_CAR_LEASING: &[&str] = &["bcr leasing", "aliat", "roviniete"];

/// Type codes marking provider-confirmed revenue inflows
const REVENUE_TYPE_CODES: &[&str] = &["MOA", "MOR"];

enum Matcher {
    /// Any listed keyword appears as a substring of the normalized text
    Keyword(&'static [&'static str]),
    /// Boundary-matched token; never fires inside a longer word
    WholeWord(Regex),
    /// Transaction type code is one of the listed codes
    TypeCode(&'static [&'static str]),
    /// Always matches (direction-gated catch-alls)
    Any,
}

struct Rule {
    /// `None` means the rule applies regardless of direction
    direction: Option<Direction>,
    matcher: Matcher,
    category: Category,
    confidence: f64,
    needs_review: bool,
    reason: &'static str,
}

impl Rule {
    fn strong(
        direction: Option<Direction>,
        matcher: Matcher,
        category: Category,
        reason: &'static str,
    ) -> Self {
        Self {
            direction,
            matcher,
            category,
            confidence: CONFIDENCE_STRONG,
            needs_review: false,
            reason,
        }
    }

    fn vendor(
        direction: Option<Direction>,
        matcher: Matcher,
        category: Category,
        reason: &'static str,
    ) -> Self {
        Self {
            direction,
            matcher,
            category,
            confidence: CONFIDENCE_VENDOR,
            needs_review: false,
            reason,
        }
    }

    fn weak(
        direction: Option<Direction>,
        matcher: Matcher,
        category: Category,
        reason: &'static str,
    ) -> Self {
        Self {
            direction,
            matcher,
            category,
            confidence: CONFIDENCE_WEAK,
            needs_review: true,
            reason,
        }
    }

    fn fallback(
        direction: Option<Direction>,
        matcher: Matcher,
        category: Category,
        reason: &'static str,
    ) -> Self {
        Self {
            direction,
            matcher,
            category,
            confidence: CONFIDENCE_FALLBACK,
            needs_review: true,
            reason,
        }
    }
}

/// Priority-ordered rule engine
pub struct Categorizer {
    rules: Vec<Rule>,
}

fn whole_word(tokens: &str) -> StatementResult<Matcher> {
    let regex = Regex::new(&format!(r"\b(?:{tokens})\b"))
        .map_err(|e| StatementError::Parse(e.to_string()))?;
    Ok(Matcher::WholeWord(regex))
}

impl Categorizer {
    /// Build the rule table. Rule order defines precedence.
    pub fn new() -> StatementResult<Self> {
        use Direction::{Inflow, Outflow};

        let rules = vec![
            Rule::strong(
                None,
                Matcher::Keyword(&["money added"]),
                Category::Revenue,
                "money added",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["dividende", "dividend", "plata dividende", "profit share"]),
                Category::Dividends,
                "dividend keyword",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["trezoreria", "anaf", "impozit", "contributii", "tax"]),
                Category::Taxes,
                "tax keyword",
            ),
            Rule::weak(
                Some(Outflow),
                whole_word("cam|cass|cas")?,
                Category::Taxes,
                "tax acronym",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["salariu", "payroll", "wage", "salary", "bonus"]),
                Category::Employees,
                "employee keyword",
            ),
            Rule::weak(
                Some(Outflow),
                whole_word("cim")?,
                Category::Employees,
                "employment contract acronym",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["mol", "omv"]),
                Category::LeasingFuel,
                "fuel keyword",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["leasing"]),
                Category::CarLeasing,
                "leasing keyword",
            ),
            Rule::vendor(
                Some(Outflow),
                Matcher::Keyword(VENDOR_CAR_LEASING),
                Category::CarLeasing,
                "car leasing vendor",
            ),
            Rule::strong(
                Some(Outflow),
                Matcher::Keyword(&["contabil", "contabilitate", "accounting", "expert"]),
                Category::Accountant,
                "accounting keyword",
            ),
            Rule::vendor(
                Some(Outflow),
                Matcher::Keyword(VENDOR_ACCOUNTANT),
                Category::Accountant,
                "accountant vendor",
            ),
            Rule::strong(
                Some(Inflow),
                Matcher::TypeCode(REVENUE_TYPE_CODES),
                Category::Revenue,
                "inflow type code",
            ),
            Rule::strong(
                Some(Inflow),
                Matcher::Keyword(&["money added", "payment received", "incasare", "incasat"]),
                Category::Revenue,
                "inflow keyword",
            ),
            Rule::weak(Some(Inflow), Matcher::Any, Category::Revenue, "inflow fallback"),
            Rule::fallback(
                Some(Outflow),
                Matcher::Any,
                Category::OtherExpenses,
                "outflow fallback",
            ),
        ];

        Ok(Self { rules })
    }

    /// Categorize one transaction. Matching runs over the lowercased,
    /// whitespace-collapsed concatenation of description and linked accounts.
    pub fn categorize(
        &self,
        description: &str,
        txn_type_code: Option<&str>,
        direction: Direction,
        to_account: Option<&str>,
        from_account: Option<&str>,
    ) -> CategorizationResult {
        let normalized = normalize(&format!(
            "{} {} {}",
            description,
            to_account.unwrap_or_default(),
            from_account.unwrap_or_default()
        ));

        for rule in &self.rules {
            if let Some(gate) = rule.direction {
                if gate != direction {
                    continue;
                }
            }
            let matched = match &rule.matcher {
                Matcher::Keyword(keywords) => keywords.iter().any(|kw| normalized.contains(kw)),
                Matcher::WholeWord(regex) => regex.is_match(&normalized),
                Matcher::TypeCode(codes) => {
                    txn_type_code.map_or(false, |code| codes.contains(&code))
                }
                Matcher::Any => true,
            };
            if matched {
                return CategorizationResult {
                    category: rule.category,
                    confidence: rule.confidence,
                    reason: rule.reason.to_string(),
                    needs_review: rule.needs_review,
                };
            }
        }

        // Neutral transactions fall through the direction-gated catch-alls
        CategorizationResult {
            category: Category::OtherExpenses,
            confidence: CONFIDENCE_FALLBACK,
            reason: "neutral fallback".to_string(),
            needs_review: true,
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
