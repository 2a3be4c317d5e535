//! Localized alert text.

use crate::alerts::{AlertCondition, AlertKind, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl Locale {
    /// Unknown or missing locales fall back to Korean.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s.starts_with("en") => Locale::En,
            _ => Locale::Ko,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ko => "ko",
            Locale::En => "en",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

pub fn title(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "BitNow 알림",
        Locale::En => "BitNow Alert",
    }
}

fn subject(condition: &AlertCondition, locale: Locale) -> String {
    let symbol = &condition.symbol;
    match (condition.kind, locale) {
        (AlertKind::Price { currency }, Locale::Ko) => format!("{} 가격({})", symbol, currency),
        (AlertKind::Price { currency }, Locale::En) => format!("{} price ({})", symbol, currency),
        (AlertKind::Rsi { interval }, _) => format!("{} RSI({})", symbol, interval),
        (AlertKind::Premium, Locale::Ko) => "김치프리미엄".to_string(),
        (AlertKind::Premium, Locale::En) => "Kimchi premium".to_string(),
        (AlertKind::Dominance, Locale::Ko) => format!("{} 도미넌스", symbol),
        (AlertKind::Dominance, Locale::En) => format!("{} dominance", symbol),
        (AlertKind::Mvrv, _) => format!("{} MVRV", symbol),
        (AlertKind::MovingAverage { period }, _) => format!("{} {}", symbol, period),
    }
}

fn format_threshold(condition: &AlertCondition) -> String {
    match condition.kind {
        AlertKind::Premium | AlertKind::Dominance => format!("{}%", condition.threshold),
        // The moving average itself is the level for a breakout.
        AlertKind::MovingAverage { .. } => String::new(),
        _ => format!("{}", condition.threshold),
    }
}

/// Price and moving-average alerts read as a breakout, the remaining
/// kinds as exceeded / fallen below.
pub fn render(condition: &AlertCondition, locale: Locale) -> AlertMessage {
    let subject = subject(condition, locale);
    let threshold = format_threshold(condition);
    let breakout = matches!(
        condition.kind,
        AlertKind::Price { .. } | AlertKind::MovingAverage { .. }
    );

    let body = match locale {
        Locale::Ko => {
            let target = if threshold.is_empty() {
                subject
            } else {
                format!("{} {}", subject, threshold)
            };
            match (breakout, condition.direction) {
                (true, Direction::Above) => format!("{}를 상향 돌파했습니다!", target),
                (true, Direction::Below) => format!("{}를 하향 돌파했습니다!", target),
                (false, Direction::Above) => format!("{}를 초과했습니다!", target),
                (false, Direction::Below) => format!("{} 미만으로 떨어졌습니다!", target),
            }
        }
        Locale::En => match (breakout, condition.direction) {
            (true, Direction::Above) => format!("{} has broken above {}", subject, threshold),
            (true, Direction::Below) => format!("{} has broken below {}", subject, threshold),
            (false, Direction::Above) => format!("{} has exceeded {}", subject, threshold),
            (false, Direction::Below) => format!("{} has fallen below {}", subject, threshold),
        },
    };

    AlertMessage {
        title: title(locale).to_string(),
        body: body.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Currency, MaPeriod, RsiInterval};
    use chrono::Utc;

    fn condition(kind: AlertKind, threshold: f64, direction: Direction) -> AlertCondition {
        AlertCondition {
            id: 1,
            owner_id: 1,
            kind,
            symbol: "BTC".to_string(),
            threshold,
            direction,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            triggered_at: None,
        }
    }

    #[test]
    fn locale_defaults_to_korean() {
        assert_eq!(Locale::parse(None), Locale::Ko);
        assert_eq!(Locale::parse(Some("fr")), Locale::Ko);
        assert_eq!(Locale::parse(Some("en-US")), Locale::En);
    }

    #[test]
    fn price_alert_reads_as_breakout() {
        let alert = condition(
            AlertKind::Price { currency: Currency::Usd },
            50000.0,
            Direction::Above,
        );
        let en = render(&alert, Locale::En);
        assert_eq!(en.title, "BitNow Alert");
        assert_eq!(en.body, "BTC price (USD) has broken above 50000");

        let ko = render(&alert, Locale::Ko);
        assert_eq!(ko.title, "BitNow 알림");
        assert_eq!(ko.body, "BTC 가격(USD) 50000를 상향 돌파했습니다!");
    }

    #[test]
    fn level_alerts_read_as_exceeded_or_fallen() {
        let rsi = condition(AlertKind::Rsi { interval: RsiInterval::H1 }, 30.0, Direction::Below);
        assert_eq!(render(&rsi, Locale::En).body, "BTC RSI(1h) has fallen below 30");

        let premium = condition(AlertKind::Premium, 3.5, Direction::Above);
        assert_eq!(render(&premium, Locale::En).body, "Kimchi premium has exceeded 3.5%");
    }

    #[test]
    fn moving_average_names_the_period() {
        let ma = condition(
            AlertKind::MovingAverage { period: MaPeriod::Ma50 },
            0.0,
            Direction::Below,
        );
        assert_eq!(render(&ma, Locale::En).body, "BTC MA50 has broken below");
        assert_eq!(render(&ma, Locale::Ko).body, "BTC MA50를 하향 돌파했습니다!");
    }
}
