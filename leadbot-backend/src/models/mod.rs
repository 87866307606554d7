pub mod bot;
pub mod bot_log;
pub mod bot_user;
pub mod consultation;
pub mod material;
pub mod operator;
pub mod settings;
pub mod subscription;

pub use bot::Bot;
pub use bot_log::{BotLogEntry, LogEventType, LogOutcome};
pub use bot_user::{BotUser, ConsultationDraft, ConversationState, SessionScratch, UserProfile};
pub use consultation::{Consultation, LeadStatus};
pub use material::{Material, MaterialCategory, MaterialKind};
pub use operator::StaffOperator;
pub use settings::{BotSettings, RecipientPolicy, ValidationSettings};
pub use subscription::SubscriptionCheck;
