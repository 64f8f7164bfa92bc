//! Router-level tests: requests go through the full middleware stack with
//! an in-memory database and a temporary media directory.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use showcase_api::{
    AppState, build_app,
    models::user::{Permission, Role},
    services::{db, media::disk::DiskMediaStore, user_service::NewUser},
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const PUBLIC_URL: &str = "http://localhost:5000";
const ADMIN_EMAIL: &str = "admin@nissal.rs";
const ADMIN_PASSWORD: &str = "admin123";

struct TestApp {
    app: Router,
    state: AppState,
    _media_dir: TempDir,
}

async fn setup() -> TestApp {
    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let media_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        Arc::new(pool),
        Arc::new(DiskMediaStore::new(media_dir.path(), PUBLIC_URL)),
        None,
        None,
        PUBLIC_URL,
        &SecretString::from("integration-secret"),
        chrono::Duration::hours(1),
    );
    state
        .users
        .bootstrap_admin("Admin", ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();
    let app = build_app(state.clone(), &["http://localhost:3000".to_string()]);
    TestApp {
        app,
        state,
        _media_dir: media_dir,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/auth/login",
                None,
                json!({"username": email, "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn create_product(&self, token: &str, catalog_number: &str) -> String {
        let (status, body) = self
            .json("POST", "/api/products", Some(token), product_body(catalog_number))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

fn product_body(catalog_number: &str) -> Value {
    json!({
        "title": {"sr": format!("Profil {catalog_number}")},
        "description": {"sr": "Aluminijumski profil"},
        "catalog": {"catalogNumber": catalog_number, "category": {"sr": "Profili"}},
        "price": {"amount": 1200.0, "currency": "RSD"},
        "availability": {"inStock": true, "quantity": 5}
    })
}

fn multipart(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "TESTBOUNDARY";
    let mut body = Vec::new();
    for (name, file, content) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        let disposition = match file {
            Some((filename, ct)) => format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {ct}\r\n\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[tokio::test]
async fn health_and_readiness() {
    let t = setup().await;
    let (status, body) = t.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, body) = t.get("/api/ready", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["disk"]["ok"], true);
}

#[tokio::test]
async fn login_me_and_token_errors() {
    let t = setup().await;

    let (status, body) = t
        .json(
            "POST",
            "/api/auth/login",
            None,
            json!({"username": ADMIN_EMAIL, "password": "wrong"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = t.json("POST", "/api/auth/login", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username and password are required");

    let token = t.admin_token().await;
    let (status, body) = t.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    assert!(body["data"].get("passwordHash").is_none());

    let (status, body) = t.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access denied. No token provided.");

    let (status, _) = t.get("/api/auth/me", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_visibility_follows_hidden_flag() {
    let t = setup().await;
    let token = t.admin_token().await;
    let id = t.create_product(&token, "NS-100").await;

    let (status, body) = t
        .json("POST", "/api/products", Some(&token), product_body("NS-100"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Catalog number already exists");

    let (status, body) = t.get("/api/products?search=ns-100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, _) = t
        .json("PATCH", &format!("/api/products/{id}/hide"), Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.get(&format!("/api/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = t.get("/api/products", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);

    let (_, body) = t
        .get("/api/products/admin/all?includeHidden=true", Some(&token))
        .await;
    assert_eq!(body["data"]["products"].as_array().unwrap().len(), 1);

    let (status, _) = t.get("/api/products/admin/all", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_images_are_stored_and_served() {
    let t = setup().await;
    let token = t.admin_token().await;
    let data = product_body("NS-200").to_string();
    let (content_type, body) = multipart(&[
        ("data", None, data.as_bytes()),
        ("images", Some(("front.png", "image/png")), b"png-bytes".as_slice()),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let image = &body["data"]["gallery"][0];
    assert_eq!(image["isMain"], true);

    let url = image["url"].as_str().unwrap();
    let path = url.strip_prefix(PUBLIC_URL).unwrap();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"png-bytes".as_slice());

    let (content_type, body) = multipart(&[
        ("data", None, product_body("NS-201").to_string().as_bytes()),
        ("images", Some(("virus.exe", "application/octet-stream")), b"MZ".as_slice()),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    let (status, _) = t.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn homepage_curation_enforces_capacity_and_roles() {
    let t = setup().await;
    let token = t.admin_token().await;

    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(t.create_product(&token, &format!("HP-{n}")).await);
    }
    for id in &ids[..4] {
        let (status, body) = t
            .json(
                "POST",
                &format!("/api/homepage-settings/featured-products/{id}"),
                Some(&token),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    let (status, body) = t
        .json(
            "POST",
            &format!("/api/homepage-settings/featured-products/{}", ids[4]),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Maximum 4 featured products allowed");

    let (status, body) = t.get("/api/homepage-settings/featured-products", None).await;
    assert_eq!(status, StatusCode::OK);
    let featured: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(featured, ids[..4].iter().map(String::as_str).collect::<Vec<_>>());

    let (status, body) = t
        .json(
            "PUT",
            "/api/homepage-settings/featured-products",
            Some(&token),
            json!({"featuredProducts": [
                {"productId": ids[0], "order": 1},
                {"productId": ids[1], "order": 1}
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Featured products must have unique order numbers");

    t.state
        .users
        .create(NewUser {
            name: "Staff".into(),
            email: "staff@nissal.rs".into(),
            password: "staff123".into(),
            role: Role::Staff,
            permissions: vec![Permission::ManageMessages],
        })
        .await
        .unwrap();
    let staff = t.login("staff@nissal.rs", "staff123").await;
    let (status, _) = t
        .json("DELETE", "/api/homepage-settings/featured-products", Some(&staff), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn add_featured_rejects_malformed_order() {
    let t = setup().await;
    let token = t.admin_token().await;
    let first = t.create_product(&token, "ORD-1").await;
    let second = t.create_product(&token, "ORD-2").await;
    let uri = format!("/api/homepage-settings/featured-products/{first}");

    for body in [json!({"order": "abc"}), json!({"order": 2.5}), json!({"order": 300})] {
        let (status, resp) = t.json("POST", &uri, Some(&token), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{resp}");
        assert_eq!(resp["message"], "Order must be an integer between 1 and 4");
    }
    let req = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{order: 2"))
        .unwrap();
    let (status, resp) = t.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["message"], "Order must be an integer between 1 and 4");

    let (_, admin) = t.get("/api/homepage-settings/admin", Some(&token)).await;
    assert!(admin["data"]["featuredProducts"].as_array().unwrap().is_empty());

    let req = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, resp) = t.send(req).await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["data"]["featuredProducts"][0]["order"], 1);

    let (status, resp) = t
        .json(
            "POST",
            &format!("/api/homepage-settings/featured-products/{second}"),
            Some(&token),
            json!({"order": 3}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["data"]["featuredProducts"][1]["order"], 3);
}

#[tokio::test]
async fn contact_submission_without_mail_relay() {
    let t = setup().await;
    let (content_type, body) = multipart(&[
        ("firstName", None, b"Petar".as_slice()),
        ("lastName", None, b"Petrovic".as_slice()),
        ("email", None, b"Petar@Example.com".as_slice()),
        ("phone", None, b"+381601234567".as_slice()),
        ("inquiryType", None, b"inquiry".as_slice()),
        ("subject", None, b"Ponuda".as_slice()),
        ("message", None, b"Molim ponudu za profile.".as_slice()),
        ("attachment", Some(("spec.txt", "text/plain")), b"dimenzije".as_slice()),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/contact/submit")
        .header(header::CONTENT_TYPE, content_type)
        .header("x-forwarded-for", "10.0.0.7")
        .body(Body::from(body))
        .unwrap();
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "new");
    let effects = body["sideEffects"].as_array().unwrap();
    assert!(effects.iter().any(|e| e["status"] == "skipped"));

    let token = t.admin_token().await;
    let id = body["data"]["id"].as_str().unwrap();
    let (status, body) = t.get(&format!("/api/contact/messages/{id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "read");
    assert_eq!(body["data"]["metadata"]["ipAddress"], "10.0.0.7");
    assert_eq!(body["data"]["attachments"].as_array().unwrap().len(), 1);

    let (status, body) = t
        .json("POST", "/api/contact/submit", None, json!({"firstName": "Petar"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "All required fields must be filled");
}

#[tokio::test]
async fn settings_views_and_patch_validation() {
    let t = setup().await;
    let token = t.admin_token().await;

    let (status, body) = t.get("/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("emailSettings").is_none());

    let (status, _) = t
        .json("PUT", "/api/settings", Some(&token), json!({"unknownField": 1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .json(
            "PUT",
            "/api/settings/contact",
            Some(&token),
            json!({"companyAddress": {"city": "Novi Sad"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["companyAddress"]["city"], "Novi Sad");
    assert!(body["data"]["companyAddress"]["street"].is_string());

    let (status, _) = t.get("/api/settings/admin", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn translation_requires_configured_client() {
    let t = setup().await;
    let token = t.admin_token().await;
    let id = t.create_product(&token, "TR-1").await;
    let (status, body) = t
        .json(
            "POST",
            &format!("/api/translations/product/{id}"),
            Some(&token),
            json!({"languages": ["en"]}),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Translation service is not configured");
}
