use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equals,
    Contains,
    EqualsAny,
    ContainsAny,
    #[serde(other)]
    Unknown,
}

/// Evaluate a trigger predicate against a resolved request value.
///
/// For the `*Any` operators negation applies to the aggregate: the negative
/// form holds only when none of `compare_values` matches.
pub fn evaluate(
    operator: ComparisonOperator,
    is_negative: bool,
    is_ignore_case: bool,
    value: &str,
    compare_value: &str,
    compare_values: &[String],
) -> bool {
    match operator {
        ComparisonOperator::Equals => equals(value, compare_value, is_negative, is_ignore_case),
        ComparisonOperator::Contains => contains(value, compare_value, is_negative, is_ignore_case),
        ComparisonOperator::EqualsAny => {
            any_matches(compare_values, is_negative, |candidate| {
                equals(value, candidate, false, is_ignore_case)
            })
        }
        ComparisonOperator::ContainsAny => {
            any_matches(compare_values, is_negative, |candidate| {
                contains(value, candidate, false, is_ignore_case)
            })
        }
        ComparisonOperator::Unknown => false,
    }
}

fn equals(value: &str, compare_value: &str, is_negative: bool, is_ignore_case: bool) -> bool {
    let matched = if is_ignore_case {
        value.to_uppercase() == compare_value.to_uppercase()
    } else {
        value == compare_value
    };
    matched != is_negative
}

fn contains(value: &str, compare_value: &str, is_negative: bool, is_ignore_case: bool) -> bool {
    // Wildcard matches any non-empty value regardless of negation.
    if compare_value == "*" && !value.is_empty() {
        return true;
    }

    let matched = if is_ignore_case {
        value
            .to_uppercase()
            .contains(compare_value.to_uppercase().as_str())
    } else {
        value.contains(compare_value)
    };
    matched != is_negative
}

fn any_matches(
    compare_values: &[String],
    is_negative: bool,
    predicate: impl Fn(&str) -> bool,
) -> bool {
    if compare_values.iter().any(|candidate| predicate(candidate)) {
        return !is_negative;
    }
    is_negative
}
