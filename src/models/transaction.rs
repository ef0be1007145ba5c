use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ApiError, FieldErrors};

/// The fixed set of transaction statuses, matched exactly and
/// case-sensitively.
pub const TRANSACTION_STATUSES: [&str; 3] = ["Successful", "Failed", "Pending"];

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub external_id: String,
    pub date: NaiveDate,
    pub time: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount: Decimal,
    pub status: String,
    pub discount: Decimal,
    pub fee_charge: Decimal,
    pub depository_institution: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTransactionRequest {
    pub external_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount: Decimal,
    pub status: String,
    /// Defaults to zero when omitted.
    pub discount: Option<Decimal>,
    /// Defaults to zero when omitted.
    pub fee_charge: Option<Decimal>,
    pub depository_institution: String,
    pub description: String,
}

impl CreateTransactionRequest {
    pub fn validate(&self) -> Result<TransactionDraft, ApiError> {
        validate_fields(TransactionFields {
            external_id: &self.external_id,
            date: &self.date,
            time: &self.time,
            transaction_type: &self.transaction_type,
            amount: self.amount,
            status: &self.status,
            discount: self.discount,
            fee_charge: self.fee_charge,
            depository_institution: &self.depository_institution,
            description: &self.description,
        })
    }
}

/// Full-record replace: every field has to be supplied and re-validated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTransactionRequest {
    pub external_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount: Decimal,
    pub status: String,
    pub discount: Option<Decimal>,
    pub fee_charge: Option<Decimal>,
    pub depository_institution: String,
    pub description: String,
}

impl UpdateTransactionRequest {
    pub fn validate(&self) -> Result<TransactionDraft, ApiError> {
        validate_fields(TransactionFields {
            external_id: &self.external_id,
            date: &self.date,
            time: &self.time,
            transaction_type: &self.transaction_type,
            amount: self.amount,
            status: &self.status,
            discount: self.discount,
            fee_charge: self.fee_charge,
            depository_institution: &self.depository_institution,
            description: &self.description,
        })
    }
}

/// A transaction payload that passed validation.
#[derive(Debug)]
pub struct TransactionDraft {
    pub external_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub transaction_type: String,
    pub amount: Decimal,
    pub status: String,
    pub discount: Decimal,
    pub fee_charge: Decimal,
    pub depository_institution: String,
    pub description: String,
}

struct TransactionFields<'a> {
    external_id: &'a str,
    date: &'a str,
    time: &'a str,
    transaction_type: &'a str,
    amount: Decimal,
    status: &'a str,
    discount: Option<Decimal>,
    fee_charge: Option<Decimal>,
    depository_institution: &'a str,
    description: &'a str,
}

fn validate_fields(fields: TransactionFields<'_>) -> Result<TransactionDraft, ApiError> {
    let mut errors = FieldErrors::new();

    if fields.external_id.trim().is_empty() {
        errors.insert("externalId", "External id is required.".to_string());
    }
    if fields.time.trim().is_empty() {
        errors.insert("time", "Time is required.".to_string());
    }
    if fields.transaction_type.trim().is_empty() {
        errors.insert("type", "Type is required.".to_string());
    }
    if fields.amount < Decimal::ZERO {
        errors.insert("amount", "Amount must be zero or greater.".to_string());
    }
    if !TRANSACTION_STATUSES.contains(&fields.status) {
        errors.insert(
            "status",
            format!("'{}' is not a valid transaction status.", fields.status),
        );
    }
    let discount = fields.discount.unwrap_or(Decimal::ZERO);
    if discount < Decimal::ZERO {
        errors.insert("discount", "Discount must be zero or greater.".to_string());
    }
    let fee_charge = fields.fee_charge.unwrap_or(Decimal::ZERO);
    if fee_charge < Decimal::ZERO {
        errors.insert(
            "feeCharge",
            "Fee charge must be zero or greater.".to_string(),
        );
    }
    if fields.depository_institution.trim().is_empty() {
        errors.insert(
            "depositoryInstitution",
            "Depository institution is required.".to_string(),
        );
    }
    let date = match NaiveDate::parse_from_str(fields.date, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert("date", "Date must use the YYYY-MM-DD format.".to_string());
            None
        }
    };

    match (errors.is_empty(), date) {
        (true, Some(date)) => Ok(TransactionDraft {
            external_id: fields.external_id.trim().to_string(),
            date,
            time: fields.time.trim().to_string(),
            transaction_type: fields.transaction_type.trim().to_string(),
            amount: fields.amount,
            status: fields.status.to_string(),
            discount,
            fee_charge,
            depository_institution: fields.depository_institution.trim().to_string(),
            description: fields.description.trim().to_string(),
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateTransactionRequest {
        CreateTransactionRequest {
            external_id: "TXN-41".to_string(),
            date: "2024-05-28".to_string(),
            time: "14:05".to_string(),
            transaction_type: "Deposit".to_string(),
            amount: Decimal::new(120000, 2),
            status: "Successful".to_string(),
            discount: None,
            fee_charge: Some(Decimal::new(150, 2)),
            depository_institution: "First National".to_string(),
            description: "Paycheck deposit".to_string(),
        }
    }

    #[test]
    fn complete_input_passes_and_defaults_discount() {
        let draft = request().validate().unwrap();
        assert_eq!(draft.discount, Decimal::ZERO);
        assert_eq!(draft.fee_charge, Decimal::new(150, 2));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut request = request();
        request.status = "Done".to_string();

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("status")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn status_matching_is_case_sensitive() {
        let mut request = request();
        request.status = "successful".to_string();

        assert!(request.validate().is_err());
    }

    #[test]
    fn negative_discount_and_fee_are_rejected() {
        let mut request = request();
        request.discount = Some(Decimal::new(-1, 0));
        request.fee_charge = Some(Decimal::new(-1, 0));

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => {
                assert!(errors.contains_key("discount"));
                assert!(errors.contains_key("feeCharge"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn type_field_uses_the_wire_name() {
        let request: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "externalId": "TXN-41",
            "date": "2024-05-28",
            "time": "14:05",
            "type": "Withdrawal",
            "amount": 25,
            "status": "Pending",
            "depositoryInstitution": "First National",
            "description": "ATM withdrawal",
        }))
        .unwrap();

        assert_eq!(request.transaction_type, "Withdrawal");
    }
}
