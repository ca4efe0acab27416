use super::*;
use proptest::prelude::*;

const CLIENT_ID: &str = "mrj0kTxsc6LoKCEJX2oyyA==";
const CLIENT_SECRET: &str = "J6QZyb+g0ucATnJa7MSG9QRm9FfVDsMF";

const REFERENCE_TIMESTAMP: i64 = 1757785623798;
const REFERENCE_NONCE: &str = "9047";
const REFERENCE_PLAINTEXT: &str = r#"{"_id":"64dd92c1f0b6684651e90e09","status":3,"type":"talking_photo","url":"https://cdn.example.com/result.mp4"}"#;
const REFERENCE_DATA: &str = "VzqkjGX88x96otJpkGGVVhJGJAQCAAgtyaUON+DoUc/6seltsg6IrVchDzLFDuSyqmKHS3R/tF+EqFVwbeAn+x+HIG1ad44BmGYNR4m6bVUwHH9Ror2CDZT4aL+MnM0SW7EexO1N3QtrvMK+BWUz7w==";
const REFERENCE_SIGNATURE: &str = "edfad184485255dd3164a2c7ef68ffd4f564c630";

fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(AkoolCredentials::new(CLIENT_ID, CLIENT_SECRET).unwrap())
}

fn reference_envelope() -> WebhookEnvelope {
    WebhookEnvelope {
        client_id: None,
        timestamp: REFERENCE_TIMESTAMP,
        nonce: REFERENCE_NONCE.to_string(),
        data_encrypt: REFERENCE_DATA.to_string(),
        signature: REFERENCE_SIGNATURE.to_string(),
    }
}

#[test]
fn reference_envelope_verifies_and_decrypts() {
    let value = verifier().open(&reference_envelope()).unwrap();
    let expected: serde_json::Value = serde_json::from_str(REFERENCE_PLAINTEXT).unwrap();
    assert_eq!(value, expected);

    let payload: CallbackPayload = serde_json::from_value(value).unwrap();
    assert_eq!(payload.status, CallbackStatus::Completed);
}

#[test]
fn seal_reproduces_reference_envelope() {
    let sealed = verifier()
        .seal(REFERENCE_PLAINTEXT, REFERENCE_TIMESTAMP, REFERENCE_NONCE)
        .unwrap();
    assert_eq!(sealed.data_encrypt, REFERENCE_DATA);
    assert_eq!(sealed.signature, REFERENCE_SIGNATURE);
    assert_eq!(sealed.client_id.as_deref(), Some(CLIENT_ID));
}

#[test]
fn envelope_parses_from_provider_json() {
    let body = format!(
        r#"{{"signature":"{}","dataEncrypt":"{}","timestamp":{},"nonce":"{}"}}"#,
        REFERENCE_SIGNATURE, REFERENCE_DATA, REFERENCE_TIMESTAMP, REFERENCE_NONCE
    );
    let envelope = WebhookEnvelope::from_json(body.as_bytes()).unwrap();
    assert_eq!(envelope, reference_envelope());
}

#[test]
fn envelope_without_signature_is_malformed() {
    let body = br#"{"dataEncrypt":"abc","timestamp":1,"nonce":"1"}"#;
    assert!(matches!(
        WebhookEnvelope::from_json(body),
        Err(WebhookError::MalformedEnvelope(_))
    ));
}

#[test]
fn signature_is_compared_case_insensitively() {
    let mut envelope = reference_envelope();
    envelope.signature = REFERENCE_SIGNATURE.to_ascii_uppercase();
    assert!(verifier().verify_signature(&envelope).is_ok());
}

#[test]
fn signature_prefix_or_extension_is_rejected() {
    let mut envelope = reference_envelope();
    envelope.signature = REFERENCE_SIGNATURE[..39].to_string();
    assert!(matches!(
        verifier().verify_signature(&envelope),
        Err(WebhookError::Authentication)
    ));
    envelope.signature = format!("{REFERENCE_SIGNATURE}0");
    assert!(matches!(
        verifier().verify_signature(&envelope),
        Err(WebhookError::Authentication)
    ));
    envelope.signature = String::new();
    assert!(verifier().verify_signature(&envelope).is_err());
}

#[test]
fn tampered_payload_fails_signature_before_decryption() {
    let mut envelope = reference_envelope();
    envelope.data_encrypt = envelope.data_encrypt.replacen('V', "W", 1);
    assert!(matches!(
        verifier().open(&envelope),
        Err(WebhookError::Authentication)
    ));
}

#[test]
fn foreign_client_id_is_rejected() {
    let mut envelope = reference_envelope();
    envelope.client_id = Some("someone-elses-client-id".to_string());
    assert!(matches!(
        verifier().verify_signature(&envelope),
        Err(WebhookError::Authentication)
    ));

    envelope.client_id = Some(CLIENT_ID.to_string());
    assert!(verifier().verify_signature(&envelope).is_ok());
}

#[test]
fn wrong_secret_is_a_decryption_error() {
    // Captured callback: the signature only involves the client id, so it
    // verifies, but this secret is not the one the payload was encrypted with.
    let envelope = WebhookEnvelope {
        client_id: None,
        timestamp: 1757785623798,
        nonce: "9047".to_string(),
        data_encrypt: "dOiIGl2CZPmj6UKlO9yzmWPW4Tb+T93rLqKQj6ES7xP7k4H5OhvVugbymXZ0kGW8v+Bfa0oJKI0RlPkC7P7ow8MGfv8ow1idyPVOpDA0ncWuZmgMLazug/Vm1yEHrDhdr77Sz4hk9O0Oezc5VHKB6/Me5xwehJZjyVSCKTe/+2lqV7ezzDhi6LmMy7sCkVwt4rOFvq8Yafi64CnCcZLzpA==".to_string(),
        signature: "9a0403251957a130fad76ea64236e02c3c521e70".to_string(),
    };
    let verifier = verifier();
    assert!(verifier.verify_signature(&envelope).is_ok());
    assert!(matches!(
        verifier.open(&envelope),
        Err(WebhookError::Decryption(_))
    ));
}

#[test]
fn invalid_base64_is_a_decryption_error() {
    assert!(matches!(
        verifier().decrypt("not base64 at all!!"),
        Err(WebhookError::Decryption(_))
    ));
}

#[test]
fn truncated_ciphertext_is_a_decryption_error() {
    let short = base64::engine::general_purpose::STANDARD.encode([7u8; 10]);
    assert!(matches!(
        verifier().decrypt(&short),
        Err(WebhookError::Decryption(_))
    ));
}

#[test]
fn non_json_plaintext_is_malformed_payload() {
    let envelope = WebhookEnvelope {
        client_id: None,
        timestamp: REFERENCE_TIMESTAMP,
        nonce: REFERENCE_NONCE.to_string(),
        data_encrypt: "rd/J3nbMcY8jpj+WzLzATQ==".to_string(),
        signature: "d0a545e490f34a4ab06b4957f941f136547ef463".to_string(),
    };
    let verifier = verifier();
    assert_eq!(
        verifier.decrypt(&envelope.data_encrypt).unwrap(),
        b"not json at all"
    );
    assert!(matches!(
        verifier.open(&envelope),
        Err(WebhookError::MalformedPayload(_))
    ));
}

#[test]
fn exact_minimum_lengths_round_trip() {
    let verifier = WebhookVerifier::new(
        AkoolCredentials::new("0123456789abcdef", "0123456789abcdefghijklmn").unwrap(),
    );
    let plaintext = r#"{"_id":"a1","status":2,"type":"video_generation"}"#;
    let envelope = verifier.seal(plaintext, 1710757981609, "1529").unwrap();
    let value = verifier.open(&envelope).unwrap();
    assert_eq!(value["_id"], "a1");
    assert_eq!(value["status"], 2);
}

#[test]
fn only_leading_bytes_of_long_credentials_matter() {
    let long = WebhookVerifier::new(
        AkoolCredentials::new(
            "0123456789abcdef-tail-is-ignored",
            "0123456789abcdefghijklmn-tail-is-ignored",
        )
        .unwrap(),
    );
    let exact = WebhookVerifier::new(
        AkoolCredentials::new("0123456789abcdef", "0123456789abcdefghijklmn").unwrap(),
    );
    let sealed = long.seal(r#"{"k":1}"#, 1, "n").unwrap();
    let decrypted = exact.decrypt(&sealed.data_encrypt).unwrap();
    assert_eq!(decrypted, br#"{"k":1}"#);
}

#[test]
fn short_secret_is_a_configuration_error() {
    let verifier =
        WebhookVerifier::new(AkoolCredentials::new(CLIENT_ID, "only-twelve!").unwrap());
    let data = "rd/J3nbMcY8jpj+WzLzATQ==";
    let envelope = WebhookEnvelope {
        client_id: None,
        timestamp: 5,
        nonce: "n".to_string(),
        data_encrypt: data.to_string(),
        signature: sign(CLIENT_ID, 5, "n", data),
    };
    assert!(matches!(
        verifier.open(&envelope),
        Err(WebhookError::Configuration(_))
    ));
    assert!(matches!(
        verifier.seal("{}", 5, "n"),
        Err(WebhookError::Configuration(_))
    ));
}

#[test]
fn short_client_id_is_a_configuration_error() {
    let verifier = WebhookVerifier::new(AkoolCredentials::new("short-id", CLIENT_SECRET).unwrap());
    assert!(matches!(
        verifier.decrypt(REFERENCE_DATA),
        Err(WebhookError::Configuration(_))
    ));
}

#[test]
fn empty_credentials_are_rejected_up_front() {
    assert!(matches!(
        AkoolCredentials::new("", CLIENT_SECRET),
        Err(WebhookError::Configuration(_))
    ));
    assert!(matches!(
        AkoolCredentials::new(CLIENT_ID, ""),
        Err(WebhookError::Configuration(_))
    ));
}

#[test]
fn debug_output_hides_the_secret() {
    let creds = AkoolCredentials::new(CLIENT_ID, CLIENT_SECRET).unwrap();
    let rendered = format!("{:?}", creds);
    assert!(rendered.contains(CLIENT_ID));
    assert!(!rendered.contains(CLIENT_SECRET));
}

#[test]
fn sign_sorts_fields_before_hashing() {
    // "1" < "a" < "b" < "c" in byte order, whatever the argument order.
    assert_eq!(sign("b", 1, "c", "a"), sign("c", 1, "a", "b"));
    assert_eq!(
        sign("b", 1, "c", "a"),
        hex::encode(Sha1::digest(b"1abc"))
    );
}

fn flip_hex_char(c: char) -> char {
    if c == '0' { '1' } else { '0' }
}

proptest! {
    #[test]
    fn signed_envelopes_verify(
        client_id in "[A-Za-z0-9+/=]{16,32}",
        timestamp in 0i64..=4_102_444_800_000,
        nonce in "[0-9]{1,6}",
        data in "[A-Za-z0-9+/]{4,64}={0,2}",
    ) {
        let verifier = WebhookVerifier::new(
            AkoolCredentials::new(client_id.clone(), CLIENT_SECRET).unwrap(),
        );
        let envelope = WebhookEnvelope {
            client_id: Some(client_id.clone()),
            timestamp,
            nonce: nonce.clone(),
            data_encrypt: data.clone(),
            signature: sign(&client_id, timestamp, &nonce, &data),
        };
        prop_assert!(verifier.verify_signature(&envelope).is_ok());

        let mut other_time = envelope.clone();
        other_time.timestamp += 1;
        prop_assert!(verifier.verify_signature(&other_time).is_err());

        let mut other_nonce = envelope.clone();
        other_nonce.nonce.push('7');
        prop_assert!(verifier.verify_signature(&other_nonce).is_err());

        let mut other_data = envelope.clone();
        other_data.data_encrypt.push('A');
        prop_assert!(verifier.verify_signature(&other_data).is_err());
    }

    #[test]
    fn any_flipped_signature_char_is_rejected(index in 0usize..40) {
        let verifier = verifier();
        let mut envelope = reference_envelope();
        let mut chars: Vec<char> = envelope.signature.chars().collect();
        chars[index] = flip_hex_char(chars[index]);
        envelope.signature = chars.into_iter().collect();
        prop_assert!(matches!(
            verifier.verify_signature(&envelope),
            Err(WebhookError::Authentication)
        ));
    }
}
