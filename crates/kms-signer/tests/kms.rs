mod common;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{Duration, Utc};
use serde_json::json;

use kms_signer::error::{SignerError, TokenError};
use kms_signer::token::StaticTokenSource;
use kms_signer::{
    HashAlgorithm, KeyReference, KmsSigner, ObjectRef, SignedUrlOptions, Signer, Token,
    TokenSource, UrlSigner,
};

use common::{Recorder, serve};

const KEY_VERSION: &str =
    "projects/your-project/locations/us-central1/keyRings/mycacerts/cryptoKeys/key1/cryptoKeyVersions/1";
const PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----\nMIIBIjAN\n-----END PUBLIC KEY-----\n";

fn signature() -> Vec<u8> {
    (0u8..=255).collect()
}

async fn kms_ok(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    recorder.record(method, uri.clone(), &headers, body);
    if uri.path().ends_with("/publicKey") {
        return Json(json!({
            "pem": PUBLIC_KEY_PEM,
            "algorithm": "RSA_SIGN_PKCS1_2048_SHA256",
            "name": KEY_VERSION,
        }));
    }
    Json(json!({
        "name": KEY_VERSION,
        "signature": STANDARD.encode(signature()),
        "signatureCrc32c": "1234",
    }))
}

async fn kms_denied(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    recorder.record(method, uri, &headers, body);
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": {
                "code": 403,
                "message": "Permission 'cloudkms.cryptoKeyVersions.useToSign' denied",
                "status": "PERMISSION_DENIED",
            }
        })),
    )
        .into_response()
}

fn key() -> KeyReference {
    KEY_VERSION.parse().unwrap()
}

fn credentials() -> Arc<dyn TokenSource> {
    Arc::new(StaticTokenSource::new(Token::bearer("kms-access-token")))
}

async fn kms_signer(router: Router<Recorder>) -> (KmsSigner, Recorder) {
    let recorder = Recorder::default();
    let base = serve(router.with_state(recorder.clone())).await;
    (KmsSigner::new(key(), credentials()).with_endpoint(base), recorder)
}

#[tokio::test]
async fn digest_is_sent_to_asymmetric_sign() {
    let (signer, recorder) = kms_signer(Router::new().fallback(kms_ok)).await;
    let digest = HashAlgorithm::Sha256.digest(b"test");

    let sig = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap();
    assert_eq!(sig, signature());

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].uri.path(), format!("/v1/{KEY_VERSION}:asymmetricSign"));
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer kms-access-token"));
    assert_eq!(
        requests[0].json(),
        json!({ "digest": { "sha256": STANDARD.encode(&digest) } })
    );
}

#[tokio::test]
async fn sha512_digest_uses_matching_field() {
    let (signer, recorder) = kms_signer(Router::new().fallback(kms_ok)).await;
    let digest = HashAlgorithm::Sha512.digest(b"test");

    signer.sign(&digest, HashAlgorithm::Sha512).await.unwrap();
    assert_eq!(
        recorder.requests()[0].json(),
        json!({ "digest": { "sha512": STANDARD.encode(&digest) } })
    );
}

#[tokio::test]
async fn repeated_calls_each_reach_kms() {
    let (signer, recorder) = kms_signer(Router::new().fallback(kms_ok)).await;
    let digest = HashAlgorithm::Sha256.digest(b"same");

    let a = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap();
    let b = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(recorder.requests().len(), 2);
}

#[tokio::test]
async fn remote_errors_carry_status_and_message() {
    let (signer, _recorder) = kms_signer(Router::new().fallback(kms_denied)).await;
    let digest = HashAlgorithm::Sha256.digest(b"test");

    let err = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap_err();
    match err {
        SignerError::Remote { status, message } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(message.starts_with("PERMISSION_DENIED"), "{message}");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
}

#[tokio::test]
async fn public_key_is_fetched_from_key_version() {
    let (signer, recorder) = kms_signer(Router::new().fallback(kms_ok)).await;

    assert_eq!(signer.public_key_pem().await.unwrap(), PUBLIC_KEY_PEM);
    let requests = recorder.requests();
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].uri.path(), format!("/v1/{KEY_VERSION}/publicKey"));
}

#[tokio::test]
async fn credential_failure_stops_before_kms() {
    struct NoCredentials;

    #[async_trait::async_trait]
    impl TokenSource for NoCredentials {
        async fn token(&self) -> Result<Token, TokenError> {
            Err(TokenError::Decode("metadata server unavailable".into()))
        }
    }

    let recorder = Recorder::default();
    let base = serve(Router::new().fallback(kms_ok).with_state(recorder.clone())).await;
    let signer = KmsSigner::new(key(), Arc::new(NoCredentials)).with_endpoint(base);

    let err = signer
        .sign(&HashAlgorithm::Sha256.digest(b"x"), HashAlgorithm::Sha256)
        .await
        .unwrap_err();
    assert!(matches!(err, SignerError::Credentials(_)));
    assert!(recorder.requests().is_empty());
}

#[tokio::test]
async fn signed_url_through_kms() {
    let (signer, recorder) = kms_signer(Router::new().fallback(kms_ok)).await;
    let url_signer = UrlSigner::new(signer);
    let start = Utc::now();
    let options = SignedUrlOptions::new(
        "kms-svc-account@your-project.iam.gserviceaccount.com",
        "GET",
        start + Duration::minutes(10),
    )
    .starting_at(start);
    let object = ObjectRef::new("your-bucket", "foo.txt");

    let url = url_signer.generate(&object, &options).await.unwrap();
    let prepared = url_signer.prepare(&object, &options, start).unwrap();

    let signature_param = url
        .query_pairs()
        .find(|(k, _)| k == "X-Goog-Signature")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(hex::decode(signature_param).unwrap(), signature());

    let expected_digest = HashAlgorithm::Sha256.digest(prepared.string_to_sign.as_bytes());
    assert_eq!(
        recorder.requests()[0].json(),
        json!({ "digest": { "sha256": STANDARD.encode(expected_digest) } })
    );
}

#[tokio::test]
async fn kms_failure_yields_no_signed_url() {
    let (signer, _recorder) = kms_signer(Router::new().fallback(kms_denied)).await;
    let options = SignedUrlOptions::new(
        "kms-svc-account@your-project.iam.gserviceaccount.com",
        "GET",
        Utc::now() + Duration::minutes(10),
    );

    let result = UrlSigner::new(signer)
        .generate(&ObjectRef::new("your-bucket", "foo.txt"), &options)
        .await;
    assert!(result.is_err());
}
