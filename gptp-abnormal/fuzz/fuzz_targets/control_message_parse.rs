#![no_main]

use libfuzzer_sys::fuzz_target;

use gptp_abnormal::{ipc::CONTROL_MESSAGE_LEN, ControlMessage};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = ControlMessage::deserialize(data) {
        assert_eq!(message.to_bytes()[..], data[..CONTROL_MESSAGE_LEN]);
    }
});
