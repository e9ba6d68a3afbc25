//! Contract Test: phpIPAM REST Mapping
//!
//! Constraints verified:
//! - Requests carry the session token obtained from `POST /user/`
//! - An expired token triggers one re-login and one re-send
//! - Not-found envelopes map to `Error::NotFound`, and to empty lists on search
//! - Custom field values are filtered to the declared schema
//! - VLAN custom field patches include the VLAN name
//! - Address deletes forward the DNS removal flag
//!
//! If this test fails, the provider will misread phpIPAM responses against a
//! real server even though the in-memory tests pass.

use phpipam_client::PhpIpamClient;
use phpipam_core::api::CustomFieldCarrier;
use phpipam_core::model::CustomFieldSet;
use phpipam_core::{Error, IpamBackend, ProviderConfig};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Basic auth for admin:hunter2
const ADMIN_AUTH: &str = "Basic YWRtaW46aHVudGVyMg==";

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 200, "success": true, "data": data}))
}

fn failure(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "code": status,
        "success": false,
        "message": message,
    }))
}

/// Client using a static app token, so no login traffic
fn token_client(server: &MockServer) -> PhpIpamClient {
    let config = ProviderConfig::new("app", "static-token").with_endpoint(format!("{}/api", server.uri()));
    PhpIpamClient::new(&config).unwrap()
}

#[tokio::test]
async fn static_token_skips_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/app/user/"))
        .respond_with(ok(json!({"token": "never"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/sections/"))
        .and(header("phpipam-token", "static-token"))
        .respond_with(ok(json!([{"id": "1", "name": "Customers"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = token_client(&server);
    client.validate_connection().await.unwrap();
}

#[tokio::test]
async fn expired_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/app/user/"))
        .and(header("authorization", ADMIN_AUTH))
        .respond_with(ok(json!({"token": "first", "expires": "2030-01-01 00:00:00"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/app/user/"))
        .and(header("authorization", ADMIN_AUTH))
        .respond_with(ok(json!({"token": "second"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/sections/"))
        .and(header("phpipam-token", "first"))
        .respond_with(failure(403, "Token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/sections/"))
        .and(header("phpipam-token", "second"))
        .respond_with(ok(json!([{"id": "1", "name": "Customers"}, {"id": "2", "name": "IPv6"}])))
        .expect(1)
        .mount(&server)
        .await;

    let config = ProviderConfig::new("app", "hunter2")
        .with_username("admin")
        .with_endpoint(format!("{}/api", server.uri()));
    let client = PhpIpamClient::new(&config).unwrap();

    let sections = client.sections().list().await.unwrap();
    let names: Vec<_> = sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Customers", "IPv6"]);
}

#[tokio::test]
async fn rejected_login_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/app/user/"))
        .respond_with(failure(500, "Invalid username or password"))
        .mount(&server)
        .await;

    let config = ProviderConfig::new("app", "wrong")
        .with_username("admin")
        .with_endpoint(format!("{}/api", server.uri()));
    let client = PhpIpamClient::new(&config).unwrap();

    let err = client.sections().list().await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
}

#[tokio::test]
async fn envelope_strings_decode_into_typed_entities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/addresses/5/"))
        .respond_with(ok(json!({
            "id": "5",
            "subnetId": "3",
            "ip": "10.0.0.5",
            "is_gateway": "1",
            "hostname": "gw",
            "tag": "2",
            "deviceId": null,
            "editDate": null,
        })))
        .mount(&server)
        .await;

    let client = token_client(&server);
    let address = client.addresses().get_by_id(5).await.unwrap();
    assert_eq!(address.subnet_id, 3);
    assert_eq!(address.ip, "10.0.0.5");
    assert!(address.is_gateway);
    assert_eq!(address.tag, 2);
    assert_eq!(address.device_id, 0);
}

#[tokio::test]
async fn not_found_maps_to_error_or_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/addresses/99/"))
        .respond_with(failure(404, "Address not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/addresses/search/10.9.9.9/"))
        .respond_with(failure(200, "Address not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/sections/Missing/"))
        .respond_with(failure(200, "Section does not exist"))
        .mount(&server)
        .await;

    let client = token_client(&server);
    assert!(client.addresses().get_by_id(99).await.unwrap_err().is_not_found());
    assert!(client.addresses().search_by_ip("10.9.9.9").await.unwrap().is_empty());
    assert!(client.sections().search_by_name("Missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn other_failures_keep_code_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/app/sections/"))
        .respond_with(failure(409, "Section with that name already exists"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/vlans/1/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let client = token_client(&server);
    let section = phpipam_core::Section {
        name: "Customers".to_string(),
        ..Default::default()
    };
    match client.sections().create(&section).await.unwrap_err() {
        Error::Api { code, message } => {
            assert_eq!(code, 409);
            assert_eq!(message, "Section with that name already exists");
        }
        other => panic!("expected Api error, got {:?}", other),
    }

    let err = client.vlans().get_by_id(1).await.unwrap_err();
    assert!(matches!(err, Error::Http(ref m) if m.contains("Non-API error")), "got {:?}", err);
}

#[tokio::test]
async fn section_name_lookup_wraps_single_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/sections/Lab%20A/"))
        .respond_with(ok(json!({"id": "4", "name": "Lab A", "strictMode": "1"})))
        .mount(&server)
        .await;

    let client = token_client(&server);
    let found = client.sections().search_by_name("Lab A").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 4);
    assert!(found[0].strict_mode);
}

#[tokio::test]
async fn cidr_search_filters_by_section() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/subnets/cidr/10.10.0.0/24/"))
        .and(query_param("filter_by", "sectionId"))
        .and(query_param("filter_value", "2"))
        .respond_with(ok(json!([{"id": "8", "subnet": "10.10.0.0", "mask": "24", "sectionId": "2"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = token_client(&server);
    let found = client
        .subnets()
        .search_by_cidr("10.10.0.0/24", Some(2))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].cidr(), "10.10.0.0/24");
}

#[tokio::test]
async fn free_slots_report_none_when_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/subnets/3/first_free/"))
        .respond_with(ok(json!("10.0.0.9")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/subnets/4/first_free/"))
        .respond_with(failure(404, "No free addresses found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/subnets/3/first_subnet/26/"))
        .respond_with(ok(json!("10.0.0.64/26")))
        .mount(&server)
        .await;

    let client = token_client(&server);
    assert_eq!(
        client.subnets().first_free_address(3).await.unwrap(),
        Some("10.0.0.9".to_string())
    );
    assert_eq!(client.subnets().first_free_address(4).await.unwrap(), None);
    assert_eq!(
        client.subnets().first_free_subnet(3, 26).await.unwrap(),
        Some("10.0.0.64/26".to_string())
    );
}

#[tokio::test]
async fn custom_field_values_are_filtered_to_schema() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/addresses/custom_fields/"))
        .respond_with(ok(json!({
            "custom_owner": {"name": "custom_owner", "type": "varchar(255)", "Comment": "", "Null": "YES", "Default": null},
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/app/addresses/5/"))
        .respond_with(ok(json!({
            "id": "5",
            "ip": "10.0.0.5",
            "description": "web",
            "custom_owner": "netops",
        })))
        .mount(&server)
        .await;

    let client = token_client(&server);
    let fields = client.addresses().custom_fields(5).await.unwrap();
    assert_eq!(
        fields,
        BTreeMap::from([("custom_owner".to_string(), json!("netops"))])
    );
}

#[tokio::test]
async fn missing_custom_field_schema_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/subnets/custom_fields/"))
        .respond_with(failure(200, "No custom fields defined"))
        .mount(&server)
        .await;

    let client = token_client(&server);
    assert!(client.subnets().custom_field_schema().await.unwrap().is_empty());
    assert!(client.subnets().custom_fields(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn vlan_custom_field_patch_carries_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/app/vlans/7/"))
        .respond_with(ok(json!({"vlanId": "7", "name": "core", "number": "100"})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/app/vlans/"))
        .and(body_json(json!({"id": "7", "name": "core", "custom_site": "ams", "custom_rack": null})))
        .respond_with(ok(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let client = token_client(&server);
    let fields = CustomFieldSet::from([
        ("custom_site".to_string(), Some("ams".to_string())),
        ("custom_rack".to_string(), None),
    ]);
    client.vlans().update_custom_fields(7, &fields).await.unwrap();
}

#[tokio::test]
async fn address_delete_forwards_dns_flag() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/app/addresses/11/"))
        .and(body_json(json!({"remove_dns": "1"})))
        .respond_with(ok(Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/app/addresses/12/"))
        .respond_with(ok(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let client = token_client(&server);
    client.addresses().delete(11, true).await.unwrap();
    client.addresses().delete(12, false).await.unwrap();
}
