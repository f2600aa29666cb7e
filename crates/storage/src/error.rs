/// All errors that can be returned by a FormStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No form with the given id.
    #[error("form not found: {form_id}")]
    FormNotFound { form_id: String },

    /// No response with the given id.
    #[error("response not found: {response_id}")]
    ResponseNotFound { response_id: String },

    /// No stored credentials for the given user.
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },

    /// A form with this id already exists.
    #[error("form already exists: {form_id}")]
    FormExists { form_id: String },

    /// A response already mirrors this (form, Airtable record) pair.
    #[error("response already exists for form {form_id} and record {airtable_record_id}")]
    DuplicateResponse {
        form_id: String,
        airtable_record_id: String,
    },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
