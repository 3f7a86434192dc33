//! CNAME validation against fixture zones served by hickory-server.

mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use dvpp::error::DnsError;
use dvpp::resolver::ResolverClient;
use dvpp::validation::{discover_authority, CnameValidator, NameserverChain, Validator};
use dvpp::ValidationRequest;

use common::{serve_zone, FixtureZone, CHALLENGE, NS_HOST, ORIGIN, TARGET};

fn validator(dns: &common::FixtureDns) -> CnameValidator {
    CnameValidator::new(dns.addr)
        .with_authority_port(dns.addr.port())
        .with_query_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_discovery_returns_first_ns() {
    let dns = serve_zone(FixtureZone::standard()).await;

    let chain = discover_authority(&ResolverClient::default(), "example.com", dns.addr)
        .await
        .unwrap();
    assert_eq!(chain, NameserverChain::Host(NS_HOST.to_string()));
    assert_eq!(chain.socket_addr(dns.addr.port()).await.unwrap(), dns.addr);
}

#[tokio::test]
async fn test_matching_cname_succeeds() {
    let dns = serve_zone(FixtureZone::standard()).await;

    let request = ValidationRequest::new("example.com", "_validate.example.com", "target.example.com.");
    let result = validator(&dns).validate(&request).await;

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.response, TARGET);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_expected_target_without_trailing_dot() {
    let dns = serve_zone(FixtureZone::standard()).await;

    let request = ValidationRequest::new("example.com", CHALLENGE, "target.example.com");
    let result = validator(&dns).validate(&request).await;

    assert!(result.success);
    assert_eq!(result.response, TARGET);
}

#[tokio::test]
async fn test_mismatched_cname_reports_observed_target() {
    let dns = serve_zone(FixtureZone::standard()).await;

    let request = ValidationRequest::new("example.com", CHALLENGE, "attacker.example.net.");
    let result = validator(&dns).validate(&request).await;

    assert!(!result.success);
    assert_eq!(result.response, TARGET);
    assert_eq!(result.errors, vec!["Invalid response"]);
}

#[tokio::test]
async fn test_missing_cname_is_no_response() {
    let zone = FixtureZone::new(ORIGIN)
        .with_ns(ORIGIN, NS_HOST)
        .with_soa(ORIGIN, NS_HOST);
    let dns = serve_zone(zone).await;

    let request = ValidationRequest::new("example.com", CHALLENGE, TARGET);
    let result = validator(&dns).validate(&request).await;

    assert!(!result.success);
    assert_eq!(result.response, "");
    assert_eq!(result.errors, vec!["No response"]);
}

#[tokio::test]
async fn test_unreachable_authority_fails_with_dns_error() {
    let dns = serve_zone(FixtureZone::standard()).await;
    let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();

    // Discovery succeeds, but the authority port has nobody answering.
    let validator = CnameValidator::new(dns.addr)
        .with_authority_port(silent.local_addr().unwrap().port())
        .with_query_timeout(Duration::from_millis(200));
    let request = ValidationRequest::new("example.com", CHALLENGE, TARGET);
    let result = validator.validate(&request).await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("timed out"), "{:?}", result.errors);
}

#[tokio::test]
async fn test_discovery_falls_back_to_soa_primary() {
    let zone = FixtureZone::new(ORIGIN)
        .with_soa(ORIGIN, NS_HOST)
        .with_cname(CHALLENGE, TARGET);
    let dns = serve_zone(zone).await;

    let chain = discover_authority(&ResolverClient::default(), "example.com", dns.addr)
        .await
        .unwrap();
    assert_eq!(chain, NameserverChain::Address(Ipv4Addr::LOCALHOST));

    let request = ValidationRequest::new("example.com", CHALLENGE, TARGET);
    let result = validator(&dns).validate(&request).await;
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.response, TARGET);
}

#[tokio::test]
async fn test_domain_outside_served_zone_is_refused() {
    let dns = serve_zone(FixtureZone::standard()).await;

    let err = discover_authority(&ResolverClient::default(), "example.org", dns.addr)
        .await
        .unwrap_err();
    assert!(matches!(err, DnsError::ResponseCode { code: 5 }), "{:?}", err);

    let request = ValidationRequest::new("example.org", "_validate.example.org", TARGET);
    let result = validator(&dns).validate(&request).await;
    assert!(!result.success);
    assert_eq!(result.response, "");
    assert_eq!(result.errors, vec!["Received DNS response code 5"]);
}
