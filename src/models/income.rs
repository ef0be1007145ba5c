use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ApiError, FieldErrors};

/// The fixed set of income categories, matched exactly and case-sensitively.
pub const INCOME_CATEGORIES: [&str; 14] = [
    "Salary",
    "Business",
    "Freelance",
    "Investments",
    "Dividends",
    "Interest",
    "Rental",
    "Royalties",
    "Pension",
    "Bonus",
    "Commission",
    "Gifts",
    "Refunds",
    "Other",
];

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Caller-chosen correlation id. Not unique: submitting the same value
    /// twice creates two rows.
    pub external_id: String,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub time: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-category aggregate used by the stats endpoint.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IncomeCategoryTotal {
    pub category: String,
    pub total: Decimal,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateIncomeRequest {
    pub external_id: String,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub date: String,
    pub time: String,
}

impl CreateIncomeRequest {
    pub fn validate(&self) -> Result<IncomeDraft, ApiError> {
        validate_fields(
            &self.external_id,
            &self.category,
            self.amount,
            &self.description,
            &self.date,
            &self.time,
        )
    }
}

/// Full-record replace: every field has to be supplied and re-validated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateIncomeRequest {
    pub external_id: String,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub date: String,
    pub time: String,
}

impl UpdateIncomeRequest {
    pub fn validate(&self) -> Result<IncomeDraft, ApiError> {
        validate_fields(
            &self.external_id,
            &self.category,
            self.amount,
            &self.description,
            &self.date,
            &self.time,
        )
    }
}

/// An income payload that passed validation.
#[derive(Debug)]
pub struct IncomeDraft {
    pub external_id: String,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub time: String,
}

fn validate_fields(
    external_id: &str,
    category: &str,
    amount: Decimal,
    description: &str,
    date: &str,
    time: &str,
) -> Result<IncomeDraft, ApiError> {
    let mut errors = FieldErrors::new();

    if external_id.trim().is_empty() {
        errors.insert("externalId", "External id is required.".to_string());
    }
    if !INCOME_CATEGORIES.contains(&category) {
        errors.insert(
            "category",
            format!("'{category}' is not a valid income category."),
        );
    }
    if amount <= Decimal::ZERO {
        errors.insert("amount", "Amount must be greater than zero.".to_string());
    }
    if description.trim().is_empty() {
        errors.insert("description", "Description is required.".to_string());
    }
    if time.trim().is_empty() {
        errors.insert("time", "Time is required.".to_string());
    }
    let date = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert("date", "Date must use the YYYY-MM-DD format.".to_string());
            None
        }
    };

    match (errors.is_empty(), date) {
        (true, Some(date)) => Ok(IncomeDraft {
            external_id: external_id.trim().to_string(),
            category: category.to_string(),
            amount,
            description: description.trim().to_string(),
            date,
            time: time.trim().to_string(),
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateIncomeRequest {
        CreateIncomeRequest {
            external_id: "INC-2024-001".to_string(),
            category: "Salary".to_string(),
            amount: Decimal::new(250000, 2),
            description: "May salary".to_string(),
            date: "2024-05-28".to_string(),
            time: "09:30".to_string(),
        }
    }

    #[test]
    fn complete_input_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn amount_must_be_strictly_positive() {
        let mut zero = request();
        zero.amount = Decimal::ZERO;
        let mut negative = request();
        negative.amount = Decimal::new(-5, 0);

        for request in [zero, negative] {
            match request.validate().unwrap_err() {
                ApiError::Validation(errors) => assert!(errors.contains_key("amount")),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut request = request();
        request.category = "Winnings".to_string();

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("category")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_external_id_is_rejected() {
        let mut request = request();
        request.external_id = "".to_string();

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("externalId")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_external_ids_are_not_a_validation_concern() {
        // The same correlation id is allowed on any number of records; the
        // data layer enforces no uniqueness for it.
        let first = request().validate().unwrap();
        let second = request().validate().unwrap();
        assert_eq!(first.external_id, second.external_id);
    }
}
