//! Statement text parser
//!
//! Turns raw per-page statement text into account blocks and parsed
//! transaction records. Individual malformed transaction chunks never fail
//! the statement: each failure is recorded as `"<currency>: <message>"` and
//! the overall status is downgraded to `Partial`.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use std::str::FromStr;

use crate::types::{
    AccountSummary, Direction, ParseStatus, StatementError, StatementResult, TRANSFER_IN_CODE,
    TRANSFER_OUT_CODE,
};

/// Substrings that mark a transaction as an inflow when no type code decides
const INFLOW_KEYWORDS: &[&str] = &["payment received", "money added", "incas", "received"];

/// One account section of a statement: metadata plus the raw transaction
/// lines collected between the column header and the next section break
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBlock {
    pub account_name: String,
    pub account_currency: String,
    pub account_iban: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub lines: Vec<String>,
}

impl AccountBlock {
    fn summary(&self) -> AccountSummary {
        AccountSummary {
            account_name: self.account_name.clone(),
            account_currency: self.account_currency.clone(),
            account_iban: self.account_iban.clone(),
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }
}

/// A transaction extracted from one chunk, with its account context
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub account_name: String,
    pub account_currency: String,
    pub account_iban: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,

    pub txn_date_utc: NaiveDate,
    pub description_raw: String,
    pub txn_type_code: Option<String>,
    pub external_txn_id: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub money_out: Option<BigDecimal>,
    pub money_in: Option<BigDecimal>,
    pub balance: Option<BigDecimal>,
    pub direction: Direction,
    pub amount: BigDecimal,
    pub signed_amount: BigDecimal,
    pub transfer_from_currency: Option<String>,
    pub transfer_to_currency: Option<String>,
    pub fx_rate_applied: Option<f64>,
}

/// Everything recovered from one statement's page text
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub accounts: Vec<AccountSummary>,
    pub transactions: Vec<ParsedTransaction>,
    pub parse_errors: Vec<String>,
    pub parse_status: ParseStatus,
}

/// Parser for the fixed statement layout
///
/// All patterns are compiled once at construction.
pub struct StatementTextParser {
    date_line: Regex,
    amount: Regex,
    account_name: Regex,
    currency: Regex,
    iban: Regex,
    period: Regex,
    header: Regex,
    txn_id: Regex,
    to_account: Regex,
    from_account: Regex,
    transfer_pair: Regex,
    fx_rate: Regex,
    fx_rate_line: Regex,
}

fn compile(pattern: &str) -> StatementResult<Regex> {
    Regex::new(pattern).map_err(|e| StatementError::Parse(e.to_string()))
}

/// Day-first date from separate day/month/year tokens; the month token may be
/// abbreviated (3-4 letters) or a full English month name
fn parse_day_month_year(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    let month = month.to_ascii_lowercase();
    let month = match month.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Day-first date from free text such as "1 Jan 2024" or "1 January 2024";
/// ISO dates are accepted as well
fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 3 {
        return None;
    }
    parse_day_month_year(tokens[0], tokens[1], tokens[2])
}

impl StatementTextParser {
    pub fn new() -> StatementResult<Self> {
        Ok(Self {
            date_line: compile(r"^(\d{1,2})\s+([A-Za-z]{3,4})\s+(\d{4})\s+")?,
            amount: compile(r"(?:[A-Z]{3}|£|€|\$)?\s*(\d{1,3}(?:[\s,]\d{3})*\.\d{2}|\d+\.\d{2})")?,
            account_name: compile(r"(?i)Account name\s+(.+)$")?,
            currency: compile(r"(?i)Currency\s+([A-Z]{3})")?,
            iban: compile(r"(?i)IBAN\s*([A-Z0-9 ]+)")?,
            period: compile(r"Transactions from (.+) to (.+)")?,
            header: compile(r"Date \(UTC\)\s+Description\s+Money out\s+Money in\s+Balance")?,
            txn_id: compile(r"(?i)ID:\s*([0-9a-f-]{16,})")?,
            to_account: compile(r"To account:\s*([A-Z0-9]+)")?,
            from_account: compile(r"From account:\s*([A-Z0-9]+)")?,
            transfer_pair: compile(r"(?s)\b([A-Z]{3})\s*[–-]>\s*.*?\b([A-Z]{3})\b")?,
            fx_rate: compile(r"FX Rate\s+([A-Z]{3})\s+1\s*=\s*([A-Z]{3})\s*([0-9.,]+)")?,
            fx_rate_line: compile(r"(?i)FX Rate.*")?,
        })
    }

    /// Parse ordered page text into account blocks and transactions.
    ///
    /// Deterministic: identical input pages yield identical outcomes.
    pub fn parse(&self, pages: &[String]) -> ParseOutcome {
        let lines = normalize_lines(&pages.join("\n"));
        let blocks = self.scan_account_blocks(&lines);

        let mut transactions = Vec::new();
        let mut parse_errors = Vec::new();

        for block in &blocks {
            for chunk in split_chunks(&self.date_line, &block.lines) {
                match self.parse_chunk(&chunk, block) {
                    Ok(parsed) => transactions.push(parsed),
                    Err(err) => parse_errors.push(format!("{}: {}", block.account_currency, err)),
                }
            }
        }

        let parse_status = if parse_errors.is_empty() {
            ParseStatus::Success
        } else {
            ParseStatus::Partial
        };

        ParseOutcome {
            accounts: blocks.iter().map(AccountBlock::summary).collect(),
            transactions,
            parse_errors,
            parse_status,
        }
    }

    /// Scan normalized lines, tracking labeled account metadata and
    /// collecting transaction-section lines between the column header and the
    /// next section break. A block is emitted only when all four required
    /// fields (name, currency, period start/end) are known.
    fn scan_account_blocks(&self, lines: &[String]) -> Vec<AccountBlock> {
        let mut blocks = Vec::new();

        let mut current_name: Option<String> = None;
        let mut current_currency: Option<String> = None;
        let mut current_iban: Option<String> = None;
        let mut period_start: Option<NaiveDate> = None;
        let mut period_end: Option<NaiveDate> = None;
        let mut collecting = false;
        let mut collected: Vec<String> = Vec::new();

        for line in lines {
            if let Some(caps) = self.account_name.captures(line) {
                current_name = Some(caps[1].trim().to_string());
                continue;
            }
            if let Some(caps) = self.currency.captures(line) {
                current_currency = Some(caps[1].to_string());
                continue;
            }
            if let Some(caps) = self.iban.captures(line) {
                current_iban = Some(caps[1].replace(' ', ""));
            }
            if let Some(caps) = self.period.captures(line) {
                // New collection window; unparseable dates leave the period
                // unset so the block is dropped by the required-field check
                period_start = parse_flexible_date(&caps[1]);
                period_end = parse_flexible_date(&caps[2]);
                collecting = false;
                collected.clear();
            }
            if self.header.is_match(line) {
                collecting = true;
                continue;
            }
            if collecting {
                if line.starts_with("Account statement") || line.starts_with("Transaction types") {
                    collecting = false;
                    if let Some(block) = emit_block(
                        &current_name,
                        &current_currency,
                        &current_iban,
                        period_start,
                        period_end,
                        &mut collected,
                    ) {
                        blocks.push(block);
                    }
                    continue;
                }
                collected.push(line.clone());
            }
        }

        if collecting {
            if let Some(block) = emit_block(
                &current_name,
                &current_currency,
                &current_iban,
                period_start,
                period_end,
                &mut collected,
            ) {
                blocks.push(block);
            }
        }

        blocks
    }

    /// Parse one transaction chunk (first line starts with a date)
    fn parse_chunk(
        &self,
        chunk: &str,
        block: &AccountBlock,
    ) -> StatementResult<ParsedTransaction> {
        let first_line = chunk.lines().next().unwrap_or_default();
        let caps = self.date_line.captures(first_line).ok_or_else(|| {
            StatementError::Parse("transaction chunk does not start with a date line".to_string())
        })?;
        let txn_date = parse_day_month_year(&caps[1], &caps[2], &caps[3]).ok_or_else(|| {
            StatementError::Parse(format!("unrecognized transaction date in '{first_line}'"))
        })?;

        // Optional 2-4 letter type code as the 4th token of the first line
        let txn_type_code = first_line
            .split(' ')
            .nth(3)
            .filter(|t| (2..=4).contains(&t.len()) && t.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|t| t.to_string());

        let external_txn_id = self
            .txn_id
            .captures(chunk)
            .map(|c| c[1].to_string());
        let to_account = self.to_account.captures(chunk).map(|c| c[1].to_string());
        let from_account = self.from_account.captures(chunk).map(|c| c[1].to_string());

        let (transfer_from_currency, transfer_to_currency) =
            match self.transfer_pair.captures(chunk) {
                Some(c) => (Some(c[1].to_string()), Some(c[2].to_string())),
                None => (None, None),
            };

        // Applied rate, normalized to GBP->RON; the reciprocal direction is
        // inverted, anything else is ignored
        let mut fx_rate_applied = None;
        if let Some(c) = self.fx_rate.captures(chunk) {
            if let Ok(rate) = c[3].replace(',', "").parse::<f64>() {
                if &c[1] == "GBP" && &c[2] == "RON" {
                    fx_rate_applied = Some(rate);
                } else if &c[1] == "RON" && &c[2] == "GBP" && rate != 0.0 {
                    fx_rate_applied = Some(1.0 / rate);
                }
            }
        }

        // Clean description: strip matched metadata fragments, re-collapse
        let description = self.fx_rate_line.replace_all(chunk, "");
        let description = self.txn_id.replace_all(&description, "");
        let description = self.to_account.replace_all(&description, "");
        let description = self.from_account.replace_all(&description, "");
        let description = collapse_whitespace(&description);

        let amounts = self.extract_amounts(first_line);
        let mut money_out: Option<BigDecimal> = None;
        let mut money_in: Option<BigDecimal> = None;
        let mut balance: Option<BigDecimal> = None;

        if !amounts.is_empty() {
            if amounts.len() >= 2 {
                balance = amounts.last().cloned();
                let primary = amounts[amounts.len() - 2].clone();
                match txn_type_code.as_deref() {
                    Some(TRANSFER_IN_CODE) => money_in = Some(primary),
                    Some(TRANSFER_OUT_CODE) => money_out = Some(primary),
                    _ => match detect_direction(chunk) {
                        Direction::Inflow => money_in = Some(primary),
                        _ => money_out = Some(primary),
                    },
                }
            } else {
                match detect_direction(chunk) {
                    Direction::Inflow => money_in = amounts.into_iter().next(),
                    _ => money_out = amounts.into_iter().next(),
                }
            }
        }

        let direction = match txn_type_code.as_deref() {
            Some(TRANSFER_IN_CODE) => Direction::Inflow,
            Some(TRANSFER_OUT_CODE) => Direction::Outflow,
            _ if money_in.is_some() => Direction::Inflow,
            _ if money_out.is_some() => Direction::Outflow,
            _ => Direction::Neutral,
        };

        let (amount, signed_amount) = if let Some(money_in) = &money_in {
            (money_in.clone(), money_in.clone())
        } else if let Some(money_out) = &money_out {
            (money_out.clone(), -money_out.clone())
        } else {
            (BigDecimal::from(0), BigDecimal::from(0))
        };

        Ok(ParsedTransaction {
            account_name: block.account_name.clone(),
            account_currency: block.account_currency.clone(),
            account_iban: block.account_iban.clone(),
            period_start: block.period_start,
            period_end: block.period_end,
            txn_date_utc: txn_date,
            description_raw: description,
            txn_type_code,
            external_txn_id,
            from_account,
            to_account,
            money_out,
            money_in,
            balance,
            direction,
            amount,
            signed_amount,
            transfer_from_currency,
            transfer_to_currency,
            fx_rate_applied,
        })
    }

    /// All two-decimal amounts in a line, thousands separators removed
    fn extract_amounts(&self, line: &str) -> Vec<BigDecimal> {
        self.amount
            .captures_iter(line)
            .filter_map(|c| {
                let raw = c[1].replace([' ', ','], "");
                BigDecimal::from_str(&raw).ok()
            })
            .collect()
    }
}

/// Build an account block if all four required fields are known; either way
/// the collected lines are consumed
fn emit_block(
    name: &Option<String>,
    currency: &Option<String>,
    iban: &Option<String>,
    period_start: Option<NaiveDate>,
    period_end: Option<NaiveDate>,
    collected: &mut Vec<String>,
) -> Option<AccountBlock> {
    let lines = std::mem::take(collected);
    match (name, currency, period_start, period_end) {
        (Some(name), Some(currency), Some(start), Some(end)) => Some(AccountBlock {
            account_name: name.clone(),
            account_currency: currency.clone(),
            account_iban: iban.clone(),
            period_start: start,
            period_end: end,
            lines,
        }),
        _ => None,
    }
}

/// Trim, collapse internal whitespace, and drop empty lines
fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| collapse_whitespace(line))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a block's lines into chunks, each starting at a date line; lines
/// before the first date line are discarded
fn split_chunks(date_line: &Regex, lines: &[String]) -> Vec<String> {
    let mut chunks: Vec<Vec<&str>> = Vec::new();
    for line in lines {
        if date_line.is_match(line) {
            chunks.push(vec![line]);
        } else if let Some(current) = chunks.last_mut() {
            current.push(line);
        }
    }
    chunks.into_iter().map(|chunk| chunk.join("\n")).collect()
}

fn detect_direction(chunk: &str) -> Direction {
    let normalized = chunk.to_lowercase();
    if INFLOW_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        Direction::Inflow
    } else {
        Direction::Outflow
    }
}
