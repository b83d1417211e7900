//! Transaction input parsing
//!
//! Accepts caller-supplied histories either as untyped JSON (an array of
//! objects) or as CSV with a header row. Malformed input fails with
//! `Error::InvalidInput` before any detection work starts.

use std::io::Read;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Parse a JSON array of transaction objects
///
/// Each element needs `id`, `merchant`, `amount` and `date`; `description`
/// is optional. Numeric ids and amounts given as numbers or strings are both
/// accepted. A `null` merchant is read as blank.
pub fn parse_transactions(value: &Value) -> Result<Vec<Transaction>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::InvalidInput("transactions must be a JSON array".into()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_transaction(index, item))
        .collect()
}

fn parse_transaction(index: usize, item: &Value) -> Result<Transaction> {
    let obj = item.as_object().ok_or_else(|| {
        Error::InvalidInput(format!("transaction {} is not an object", index))
    })?;

    let field = |name: &str| {
        obj.get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::InvalidInput(format!("transaction {} missing '{}'", index, name)))
    };

    let id = match field("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(Error::InvalidInput(format!(
                "transaction {} has invalid id: {}",
                index, other
            )))
        }
    };

    // A null merchant is kept blank and lands in the unknown group
    let merchant = match obj.get("merchant") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => String::new(),
        Some(_) => {
            return Err(Error::InvalidInput(format!(
                "transaction {} merchant must be a string",
                index
            )))
        }
        None => {
            return Err(Error::InvalidInput(format!(
                "transaction {} missing 'merchant'",
                index
            )))
        }
    };

    let amount = match field("amount")? {
        Value::Number(n) => parse_amount(&n.to_string()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
    .ok_or_else(|| Error::InvalidInput(format!("transaction {} has invalid amount", index)))?;

    let date = field("date")?
        .as_str()
        .and_then(parse_date)
        .ok_or_else(|| Error::InvalidInput(format!("transaction {} has invalid date", index)))?;

    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Transaction {
        id,
        merchant,
        amount,
        date,
        description,
    })
}

/// Parse a CSV transaction export
///
/// Columns are located by header name (case-insensitive): `date`,
/// `merchant` (or `description`/`name`), `amount`, and optional `id` and
/// `description`. Rows without an id get their 1-based row number.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_lowercase()).collect();
    let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));

    let date_col = column(&["date", "transaction date", "posted_date"])
        .ok_or_else(|| Error::InvalidInput("CSV missing 'date' column".into()))?;
    let amount_col = column(&["amount"])
        .ok_or_else(|| Error::InvalidInput("CSV missing 'amount' column".into()))?;
    let merchant_col = column(&["merchant", "merchant_name", "name"])
        .or_else(|| column(&["description"]))
        .ok_or_else(|| Error::InvalidInput("CSV missing 'merchant' column".into()))?;
    let id_col = column(&["id", "transaction_id"]);
    let description_col = column(&["description", "memo"]).filter(|c| *c != merchant_col);

    let mut transactions = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row + 1;

        let date = record
            .get(date_col)
            .and_then(parse_date)
            .ok_or_else(|| Error::InvalidInput(format!("row {}: invalid date", line)))?;
        let amount = record
            .get(amount_col)
            .and_then(parse_amount)
            .ok_or_else(|| Error::InvalidInput(format!("row {}: invalid amount", line)))?;
        let merchant = record
            .get(merchant_col)
            .ok_or_else(|| Error::InvalidInput(format!("row {}: missing merchant", line)))?
            .to_string();
        let id = id_col
            .and_then(|c| record.get(c))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| line.to_string());
        let description = description_col
            .and_then(|c| record.get(c))
            .unwrap_or_default()
            .to_string();

        transactions.push(Transaction {
            id,
            merchant,
            amount,
            date,
            description,
        });
    }

    debug!("Parsed {} CSV transactions", transactions.len());
    Ok(transactions)
}

/// Parse a date in ISO or US format; timestamps keep only their date part
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.get(..10).filter(|p| p.contains('-')).unwrap_or(s);

    ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse an amount string, handling currency symbols and commas
fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_transactions_json() {
        let value = json!([
            {"id": "t1", "merchant": "NETFLIX.COM", "amount": 15.99, "date": "2024-01-15"},
            {"id": 2, "merchant": "SPOTIFY USA", "amount": "-10.99", "date": "2024-01-20T08:00:00Z",
             "description": "music"}
        ]);

        let txs = parse_transactions(&value).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].amount, dec!(15.99));
        assert_eq!(txs[1].id, "2");
        assert_eq!(txs[1].amount, dec!(-10.99));
        assert_eq!(txs[1].date, NaiveDate::from_ymd_opt(2024, 1, 20).unwrap());
        assert_eq!(txs[1].description, "music");
    }

    #[test]
    fn test_parse_transactions_not_array() {
        let err = parse_transactions(&json!({"merchant": "x"})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_parse_transactions_missing_field() {
        let value = json!([{"id": "1", "merchant": "HULU", "date": "2024-01-01"}]);
        let err = parse_transactions(&value).unwrap_err();
        assert!(err.to_string().contains("missing 'amount'"));
    }

    #[test]
    fn test_parse_transactions_null_merchant() {
        let value = json!([{"id": "1", "merchant": null, "amount": 4.5, "date": "2024-01-01"}]);
        let txs = parse_transactions(&value).unwrap();
        assert_eq!(txs[0].merchant, "");

        let value = json!([{"id": "1", "amount": 4.5, "date": "2024-01-01"}]);
        let err = parse_transactions(&value).unwrap_err();
        assert!(err.to_string().contains("missing 'merchant'"));

        let value = json!([{"id": "1", "merchant": 7, "amount": 4.5, "date": "2024-01-01"}]);
        assert!(parse_transactions(&value).is_err());
    }

    #[test]
    fn test_parse_transactions_bad_date() {
        let value = json!([{"id": "1", "merchant": "HULU", "amount": 1, "date": "yesterday"}]);
        assert!(parse_transactions(&value).is_err());
    }

    #[test]
    fn test_parse_csv() {
        let csv = "Date,Merchant,Amount,Description\n\
                   2024-01-15,NETFLIX.COM,$15.99,streaming\n\
                   01/16/2024,SQ *STARBUCKS #543,(5.50),\n";

        let txs = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].id, "1");
        assert_eq!(txs[0].description, "streaming");
        assert_eq!(txs[1].amount, dec!(-5.50));
        assert_eq!(txs[1].merchant, "SQ *STARBUCKS #543");
    }

    #[test]
    fn test_parse_csv_description_as_merchant() {
        let csv = "id,date,description,amount\nabc,2024-03-01,HULU,17.99\n";
        let txs = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(txs[0].id, "abc");
        assert_eq!(txs[0].merchant, "HULU");
        assert_eq!(txs[0].description, "");
    }

    #[test]
    fn test_parse_csv_missing_column() {
        let csv = "date,merchant\n2024-01-01,HULU\n";
        assert!(matches!(
            parse_csv(csv.as_bytes()).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("(100.00)"), Some(dec!(-100.00)));
        assert_eq!(parse_amount("abc"), None);
    }
}
