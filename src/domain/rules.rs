//! Per-step branching and suppression rules.
//!
//! Rules are persisted as a loose JSON object on the step row. They are
//! decoded once when the step is loaded; unknown keys, missing keys and
//! malformed values all decode to an inactive rule.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepRules {
    pub suppress_weekend: bool,
    pub suppress_holiday: bool,
    pub redirect_on_completion: Option<i64>,
    pub redirect_on_repeat: Option<i64>,
    pub redirect_on_click: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawStepRules {
    no_weekend: Option<Value>,
    no_holidays: Option<Value>,
    redirect_target: Option<Value>,
    if_repass_target: Option<Value>,
    redirect_on_click: Option<Value>,
}

impl StepRules {
    /// Decode the persisted rules payload. Never fails: an absent or
    /// unreadable payload yields no rules.
    pub fn from_json(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };

        let parsed = serde_json::from_str::<Value>(raw).and_then(|value| match value {
            Value::Object(_) => serde_json::from_value::<RawStepRules>(value),
            _ => Ok(RawStepRules::default()),
        });

        match parsed {
            Ok(parsed) => Self {
                suppress_weekend: truthy(parsed.no_weekend.as_ref()),
                suppress_holiday: truthy(parsed.no_holidays.as_ref()),
                redirect_on_completion: journey_ref(parsed.redirect_target.as_ref()),
                redirect_on_repeat: journey_ref(parsed.if_repass_target.as_ref()),
                redirect_on_click: journey_ref(parsed.redirect_on_click.as_ref()),
            },
            Err(err) => {
                tracing::warn!(
                    target = "dripline::domain::rules",
                    error = %err,
                    "ignoring unreadable step rules"
                );
                Self::default()
            }
        }
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

fn journey_ref(value: Option<&Value>) -> Option<i64> {
    let id = match value? {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}
