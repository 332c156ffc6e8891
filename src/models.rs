use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Income,
    Expense,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Income => "income",
            Kind::Expense => "expense",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Kind::Income => "Receita",
            Kind::Expense => "Despesa",
        }
    }

    pub fn parse(value: &str) -> Option<Kind> {
        match value.trim() {
            "income" => Some(Kind::Income),
            "expense" => Some(Kind::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Paid,
    Pending,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Paid => "paid",
            Status::Pending => "pending",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Paid => "Pago",
            Status::Pending => "A Pagar / Pendente",
        }
    }

    pub fn parse(value: &str) -> Option<Status> {
        match value.trim() {
            "paid" => Some(Status::Paid),
            "pending" => Some(Status::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

/// Fixed option lists offered by the forms and accepted by validation.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub categories: &'static [&'static str],
    pub payment_methods: &'static [&'static str],
    pub kinds: &'static [Choice],
    pub statuses: &'static [Choice],
}

impl Catalog {
    pub const STANDARD: Catalog = Catalog {
        categories: &[
            "Alimentação",
            "Transporte",
            "Moradia",
            "Lazer",
            "Saúde",
            "Salário",
            "Outros",
        ],
        payment_methods: &["Cartão de Crédito", "Débito", "Dinheiro", "PIX", "Boleto"],
        kinds: &[
            Choice { value: "income", label: "Receita" },
            Choice { value: "expense", label: "Despesa" },
        ],
        statuses: &[
            Choice { value: "paid", label: "Pago" },
            Choice { value: "pending", label: "A Pagar / Pendente" },
        ],
    };

    pub fn category(&self, value: &str) -> AppResult<String> {
        let value = value.trim();
        if self.categories.contains(&value) {
            Ok(value.to_string())
        } else {
            Err(AppError::Validation(format!("Categoria desconhecida: {value}")))
        }
    }

    pub fn payment_method(&self, value: &str) -> AppResult<String> {
        let value = value.trim();
        if self.payment_methods.contains(&value) {
            Ok(value.to_string())
        } else {
            Err(AppError::Validation(format!(
                "Método de pagamento desconhecido: {value}"
            )))
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::STANDARD
    }
}

/// Validated transaction fields, ready to be written for one owner.
#[derive(Debug, Clone)]
pub struct TransactionInput {
    pub name: String,
    pub amount_cents: i64,
    pub kind: Kind,
    pub category: String,
    pub occurred_on: NaiveDate,
    pub payment_method: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub name: String,
    pub amount_cents: i64,
    pub kind: Kind,
    pub category: String,
    pub occurred_on: NaiveDate,
    pub payment_method: String,
    pub status: Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub income_cents: i64,
    pub expense_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashFlowRecord {
    pub category: String,
    pub income_cents: i64,
    pub expense_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetDetailRecord {
    pub category: String,
    pub planned_cents: i64,
    pub spent_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_accepts_known_values_only() {
        let catalog = Catalog::default();
        assert_eq!(catalog.category(" Lazer ").unwrap(), "Lazer");
        assert!(matches!(catalog.category("Viagem"), Err(AppError::Validation(_))));
        assert_eq!(catalog.payment_method("PIX").unwrap(), "PIX");
        assert!(catalog.payment_method("Cheque").is_err());
    }

    #[test]
    fn kind_and_status_parse_their_storage_names() {
        assert_eq!(Kind::parse("income"), Some(Kind::Income));
        assert_eq!(Kind::parse("Receita"), None);
        assert_eq!(Status::parse("pending"), Some(Status::Pending));
        assert_eq!(Status::Pending.label(), "A Pagar / Pendente");
    }
}
