//! Base, table and field catalog for the form builder.
//!
//! Only fields whose type maps to a [`QuestionType`] are offered; select
//! choices come back as [`SelectOption`]s ready to store on a question.

use std::sync::Arc;

use formsync_core::{QuestionType, SelectOption};
use serde::Serialize;

use crate::api::{AirtableApi, ApiError, BaseInfo, FieldInfo, TableInfo};
use crate::auth::with_token_refresh;
use crate::tokens::{TokenError, TokenProvider};

/// Errors from a catalog lookup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("user {user_id} has no Airtable credentials")]
    NoCredentials { user_id: String },

    #[error("table {table_id} not found in base {base_id}")]
    TableNotFound { base_id: String, table_id: String },

    #[error("Airtable schema request failed: {0}")]
    Upstream(#[from] ApiError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// A field a question can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Whether answers are lists.
    pub multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
}

impl CatalogField {
    /// `None` for field types no question can use.
    pub fn from_field(field: &FieldInfo) -> Option<Self> {
        let kind = QuestionType::from_airtable(&field.kind)?;
        let options = match kind {
            QuestionType::SingleSelect | QuestionType::MultipleSelects => Some(choices(field)),
            _ => None,
        };
        Some(CatalogField {
            id: field.id.clone(),
            name: field.name.clone(),
            kind,
            multiple: kind.is_list(),
            options,
        })
    }
}

/// `options.choices` of a select field. Malformed choices are dropped.
fn choices(field: &FieldInfo) -> Vec<SelectOption> {
    field
        .options
        .as_ref()
        .and_then(|o| o.get("choices"))
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Schema lookups made with a form owner's credentials.
#[derive(Clone)]
pub struct CatalogService {
    api: Arc<dyn AirtableApi>,
    tokens: Arc<dyn TokenProvider>,
}

impl CatalogService {
    pub fn new(api: Arc<dyn AirtableApi>, tokens: Arc<dyn TokenProvider>) -> Self {
        CatalogService { api, tokens }
    }

    async fn token(&self, user_id: &str) -> Result<String, CatalogError> {
        self.tokens
            .access_token(user_id)
            .await?
            .ok_or_else(|| CatalogError::NoCredentials {
                user_id: user_id.to_string(),
            })
    }

    pub async fn bases(&self, user_id: &str) -> Result<Vec<BaseInfo>, CatalogError> {
        let mut token = self.token(user_id).await?;
        let api = &self.api;
        let bases = with_token_refresh(self.tokens.as_ref(), user_id, &mut token, |t| async move {
            api.list_bases(&t).await
        })
        .await?;
        Ok(bases)
    }

    pub async fn tables(
        &self,
        user_id: &str,
        base_id: &str,
    ) -> Result<Vec<TableInfo>, CatalogError> {
        let mut token = self.token(user_id).await?;
        let api = &self.api;
        let tables = with_token_refresh(self.tokens.as_ref(), user_id, &mut token, |t| async move {
            api.list_tables(&t, base_id).await
        })
        .await?;
        Ok(tables)
    }

    /// Supported fields of one table, in table order.
    pub async fn fields(
        &self,
        user_id: &str,
        base_id: &str,
        table_id: &str,
    ) -> Result<Vec<CatalogField>, CatalogError> {
        let tables = self.tables(user_id, base_id).await?;
        let table = tables
            .iter()
            .find(|t| t.id == table_id)
            .ok_or_else(|| CatalogError::TableNotFound {
                base_id: base_id.to_string(),
                table_id: table_id.to_string(),
            })?;
        let fields: Vec<CatalogField> = table
            .fields
            .iter()
            .filter_map(CatalogField::from_field)
            .collect();
        tracing::debug!(
            user_id,
            base_id,
            table_id,
            total = table.fields.len(),
            supported = fields.len(),
            "listed table fields"
        );
        Ok(fields)
    }
}
