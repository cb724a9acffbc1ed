//! Context phase: deterministic signal derivation.

use chrono::Timelike;

use crate::types::{
    BehavioralSignals, CustomerBehavior, DerivedSignals, Transaction, TransactionSignals,
};

/// Deviation weight of an off-hours transaction.
pub const OFF_HOURS_WEIGHT: f64 = 0.20;

/// Deviation weight of a transaction outside the usual countries.
pub const FOREIGN_WEIGHT: f64 = 0.20;

/// Deviation weight of an unrecognised device.
pub const UNKNOWN_DEVICE_WEIGHT: f64 = 0.25;

/// Amount-ratio tiers, highest first: (minimum ratio, severity).
const AMOUNT_SEVERITY: [(f64, f64); 4] = [(10.0, 0.60), (5.0, 0.45), (3.0, 0.35), (2.0, 0.20)];

/// Derive transaction and behavioral signals from the customer profile.
pub fn derive(transaction: &Transaction, behavior: &CustomerBehavior) -> DerivedSignals {
    let amount_ratio = if behavior.average_amount > 0.0 {
        transaction.amount / behavior.average_amount
    } else {
        1.0
    };

    let hour = transaction.timestamp.hour();
    let off_hours = !behavior.usual_hours.contains(hour);
    let foreign = !contains_ignore_case(&behavior.usual_countries, &transaction.country);
    let unknown_device = !contains_ignore_case(&behavior.usual_devices, &transaction.device_id);

    let mut anomalies = Vec::new();
    let mut deviation = 0.0;

    let severity = amount_severity(amount_ratio);
    if severity > 0.0 {
        deviation += severity;
        anomalies.push(format!(
            "amount is {:.1}x the customer's average",
            amount_ratio
        ));
    }
    if off_hours {
        deviation += OFF_HOURS_WEIGHT;
        anomalies.push(format!(
            "transaction at {:02}:00 UTC is outside usual hours {:02}-{:02}",
            hour, behavior.usual_hours.start, behavior.usual_hours.end
        ));
    }
    if foreign {
        deviation += FOREIGN_WEIGHT;
        anomalies.push(format!(
            "country {} is not among the customer's usual countries",
            transaction.country.to_uppercase()
        ));
    }
    if unknown_device {
        deviation += UNKNOWN_DEVICE_WEIGHT;
        anomalies.push(format!("unrecognised device {}", transaction.device_id));
    }

    DerivedSignals {
        transaction: TransactionSignals {
            amount_ratio,
            off_hours,
            foreign,
            unknown_device,
        },
        behavioral: BehavioralSignals {
            deviation_score: deviation.clamp(0.0, 1.0),
            anomalies,
        },
    }
}

/// Severity contributed by the amount ratio alone.
pub fn amount_severity(ratio: f64) -> f64 {
    AMOUNT_SEVERITY
        .iter()
        .find(|(min_ratio, _)| ratio >= *min_ratio)
        .map(|(_, severity)| *severity)
        .unwrap_or(0.0)
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|item| item.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HourRange;
    use chrono::{TimeZone, Utc};

    fn behavior() -> CustomerBehavior {
        CustomerBehavior {
            customer_id: "cust-1".to_string(),
            average_amount: 100.0,
            usual_hours: HourRange::new(8, 20),
            usual_countries: vec!["US".to_string()],
            usual_devices: vec!["dev-1".to_string()],
        }
    }

    fn transaction(amount: f64, hour: u32, country: &str, device: &str) -> Transaction {
        Transaction {
            id: "tx-1".to_string(),
            customer_id: "cust-1".to_string(),
            amount,
            currency: "USD".to_string(),
            country: country.to_string(),
            channel: "online".to_string(),
            device_id: device.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 14, hour, 15, 0).unwrap(),
            merchant_id: "m-1".to_string(),
        }
    }

    #[test]
    fn test_usual_transaction_has_no_anomalies() {
        let signals = derive(&transaction(50.0, 12, "US", "dev-1"), &behavior());
        assert_eq!(signals.behavioral.deviation_score, 0.0);
        assert!(signals.behavioral.anomalies.is_empty());
        assert!((signals.transaction.amount_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_comparisons_ignore_case() {
        let signals = derive(&transaction(50.0, 12, "us", "DEV-1"), &behavior());
        assert!(!signals.transaction.foreign);
        assert!(!signals.transaction.unknown_device);
    }

    #[test]
    fn test_every_factor_contributes_in_order() {
        let signals = derive(&transaction(1700.0, 3, "BR", "dev-9"), &behavior());
        assert!(signals.transaction.off_hours);
        assert!(signals.transaction.foreign);
        assert!(signals.transaction.unknown_device);
        assert!((signals.behavioral.deviation_score - 1.0).abs() < 1e-9);

        let anomalies = &signals.behavioral.anomalies;
        assert_eq!(anomalies.len(), 4);
        assert!(anomalies[0].starts_with("amount is 17.0x"));
        assert!(anomalies[1].contains("outside usual hours"));
        assert!(anomalies[2].contains("BR"));
        assert!(anomalies[3].contains("dev-9"));
    }

    #[test]
    fn test_zero_average_uses_neutral_ratio() {
        let mut profile = behavior();
        profile.average_amount = 0.0;
        let signals = derive(&transaction(500.0, 12, "US", "dev-1"), &profile);
        assert_eq!(signals.transaction.amount_ratio, 1.0);
    }

    #[test]
    fn test_amount_severity_tiers() {
        assert_eq!(amount_severity(1.9), 0.0);
        assert_eq!(amount_severity(2.0), 0.20);
        assert_eq!(amount_severity(3.6), 0.35);
        assert_eq!(amount_severity(5.0), 0.45);
        assert_eq!(amount_severity(30.0), 0.60);
    }
}
