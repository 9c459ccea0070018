mod basic_auth;
mod body;
mod key_value;
mod lookup;
mod options;
mod variables;

pub use basic_auth::{extract_basic_auth, BasicAuth};
pub use body::{
    materialize_body, parse_answers, parse_sample_result, result_header, BotGraph, HeaderCell,
    MaterializedBody,
};
pub use key_value::{compile_key_values, KeyValueMap};
pub use lookup::{find_webhook_step, linked_typebot_ids, step_position, LookupError, WebhookTarget};
pub use options::prepare_webhook;
pub use variables::resolve_variables;
