//! Session lifecycle and message dispatch core for the Alya chat bot.
//!
//! Data flow: [`SessionManager`] → [`EventRouter`] → [`MessageNormalizer`]
//! → [`PauseGate`] → [`CommandDispatcher`] → [`ContextFactory`].
//!
//! The transport, storage, paused-chat registry, greeter and the commands
//! themselves are collaborators supplied from outside through the traits in
//! [`transport`], [`store`] and [`command`].

pub mod command;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod router;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    command::{CommandDescriptor, CommandHandler, CommandInput, Trigger, handler_fn},
    context::{Context, ContextFactory, ContextKind},
    credentials::{CredentialStore, SeedOutcome},
    dispatch::{CommandDispatcher, DispatchReport, TriggerMatch},
    error::{Error, Result},
    gate::{GateDecision, PauseGate},
    normalize::{MessageNormalizer, NormalizedMessage},
    router::{BOT_NAME, EventRouter},
    session::{ConnectionState, ReconnectPolicy, SessionManager, Shutdown},
    settings::{BotSettings, CommandPrefix},
    store::{Greeter, MessageStore, PausedChatEntry, PausedChats},
    transport::{
        CloseReason, Connection, ConnectOptions, ConnectionUpdate, MessagesUpsert, SessionEvent,
        SessionHandle, Transport, UpsertKind,
    },
};
