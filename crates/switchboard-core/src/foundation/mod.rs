//! Foundation layer - the protocol-agnostic vocabulary.
//!
//! This module contains the building blocks every other layer speaks:
//! - Identities of participants and channels
//! - Inbound events and sendable actions
//! - The generic message envelope
//! - Locale normalization
//! - Error types

pub mod action;
pub mod error;
pub mod identity;
pub mod locale;
pub mod message;

pub use action::{
    Action, ActionKind, ActionMetadata, ActionState, Attachment, Choice, DebugTrace, Event,
    EventHeader, Location, NLP_PARAM, Sentence,
};
pub use error::{
    AdapterError, AdapterResult, AuthError, AuthResult, DispatchError, DispatchResult,
    FailureCause, StoreError, StoreResult, TransportError, TransportResult,
};
pub use identity::{ConnectorType, PlayerId, PlayerType, UserInterface};
pub use locale::{InvalidLocale, Locale, parse_locale};
pub use message::{
    AttachmentType, ConnectorMessage, GenericAttachment, GenericChoice, GenericElement,
    GenericLocation, GenericMessage, GeoPoint, SUBTITLE_PARAM, TEXT_PARAM, TITLE_PARAM,
};
