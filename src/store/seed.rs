//! Synthetic contact record generation for local testing and demos.
//!
//! Produces records shaped like real contact-center survey data: identity
//! and routing attributes plus wide question/answer column pairs. Mixed
//! casing is intentional, it exercises the catalog's case folding.

use crate::export::partition::{format_date, DateFormat};
use crate::record::{AttrValue, Record};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

const AGENTS: [&str; 4] = ["asmith", "jdoe", "mgarcia", "lchen"];

const QA_TOPICS: [(&str, &str); 3] = [
    ("WelcomeGuide_Q1", "How easy was it to get started?"),
    ("Support_Q1", "Was your issue resolved today?"),
    ("Checkout", "How smooth was the checkout process?"),
];

/// Generate `count` demo records, spread backwards hour by hour from
/// `now`, with the date attribute encoded per `format`.
pub fn demo_records(
    count: usize,
    partition_attr: &str,
    partition_value: &str,
    date_attr: &str,
    format: DateFormat,
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, Record)> {
    (0..count)
        .map(|i| {
            let ts = now - Duration::hours(i as i64 + 1);
            let mut record = Record::new();
            record.insert("ContactId", AttrValue::Str(Uuid::new_v4().to_string()));
            record.insert(partition_attr, AttrValue::Str(partition_value.to_string()));
            record.insert(date_attr, format_date(ts, format));
            record.insert("Agent", AttrValue::Str(AGENTS[i % AGENTS.len()].to_string()));
            record.insert("nps_score", AttrValue::Num((i % 11) as f64));

            // One answered survey topic per record, rotating
            let (answer_col, question_text) = QA_TOPICS[i % QA_TOPICS.len()];
            record.insert(
                format!("{answer_col}_Question"),
                AttrValue::Str(question_text.to_string()),
            );
            record.insert(answer_col, AttrValue::Num(((i * 3) % 5 + 1) as f64));

            // Occasional free-text comment, occasionally missing
            if i % 3 == 0 {
                record.insert("Comment", AttrValue::Str("quick and helpful".to_string()));
            } else if i % 3 == 1 {
                record.insert("Comment", AttrValue::Absent);
            }

            (ts, record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_records_shape() {
        let now = Utc::now();
        let records = demo_records(6, "Channel", "CHAT", "InitiationTimestamp", DateFormat::Iso, now);
        assert_eq!(records.len(), 6);

        for (ts, record) in &records {
            assert!(*ts < now);
            assert!(record.attrs.contains_key("ContactId"));
            assert_eq!(
                record.attrs.get("Channel"),
                Some(&AttrValue::Str("CHAT".into()))
            );
            assert!(record.get_ci("initiationtimestamp").is_some());
        }

        // Every topic shows up with its question pair
        let has_pair = records.iter().any(|(_, r)| {
            r.attrs.contains_key("WelcomeGuide_Q1") && r.attrs.contains_key("WelcomeGuide_Q1_Question")
        });
        assert!(has_pair);
    }
}
