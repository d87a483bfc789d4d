pub mod config;
pub mod errors;
pub mod flow;
pub mod form;
pub mod record;
pub mod schema;
pub mod store;
pub mod submission;

pub use errors::StoreError;
pub use flow::{transition, IntakeEvent, IntakeState, IntakeTransitionError};
pub use form::{
    FieldKind, FieldOption, FormBuilder, FormDefinition, FormField, OptionSource, ResolvedField,
    ResolvedForm,
};
pub use record::{BindingKind, PropertyBinding, PropertyValue, RecordDraft, RecordMapping};
pub use schema::{CollectionSchema, PropertyDescriptor};
pub use store::{CreatedRecord, RecordStore};
pub use submission::{SubmissionValues, SubmittingUser};
