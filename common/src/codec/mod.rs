pub mod action;
pub mod recording;

pub use action::{
    decode_action_payload, decode_action_record, encode_action_payload, encode_action_record,
};
pub use recording::{
    decode_header, decode_recorded_page, decode_recording, encode_recorded_page,
    encode_recording,
};
