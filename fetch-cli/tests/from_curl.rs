mod common;

use common::{assert_exit_code, assert_stderr_contains, run};

/// Dry-run both invocations and compare the canonical request renderings.
fn assert_equivalent(curl_cmd: &str, native: &[&str]) {
    let translated = run(&["--dry-run", "--from-curl", curl_cmd]);
    assert_exit_code(&translated, 0);

    let mut native_args = vec!["--dry-run"];
    native_args.extend_from_slice(native);
    let direct = run(&native_args);
    assert_exit_code(&direct, 0);

    assert_eq!(
        translated.stdout, direct.stdout,
        "curl translation diverged from native flags\ncurl: {curl_cmd}\nnative: {native:?}"
    );
}

// -- Equivalence with native flags --------------------------------------------

#[test]
fn post_with_header_and_body() {
    assert_equivalent(
        r#"curl -X POST -H 'Content-Type: application/json' -d '{"k":1}' https://api.example.com/v"#,
        &[
            "-m",
            "POST",
            "-H",
            "Content-Type: application/json",
            "-d",
            r#"{"k":1}"#,
            "https://api.example.com/v",
        ],
    );
}

#[test]
fn get_with_query_data() {
    assert_equivalent(
        "curl -G -d a=1 -d b=2 https://example.com/search",
        &["-m", "GET", "-q", "a=1", "-q", "b=2", "https://example.com/search"],
    );
}

#[test]
fn basic_auth_user() {
    assert_equivalent(
        "curl -u alice:secret https://example.com",
        &["--basic", "alice:secret", "https://example.com"],
    );
}

#[test]
fn silent_and_insecure_cluster() {
    assert_equivalent(
        "curl -sk https://example.com",
        &["-s", "--insecure", "https://example.com"],
    );
}

#[test]
fn json_shorthand() {
    assert_equivalent(
        r#"curl --json '{"a":1}' https://example.com"#,
        &[
            "-H",
            "Content-Type: application/json",
            "-H",
            "Accept: application/json",
            "-d",
            r#"{"a":1}"#,
            "https://example.com",
        ],
    );
}

#[test]
fn head_request() {
    assert_equivalent(
        "curl -I https://example.com",
        &["-m", "HEAD", "https://example.com"],
    );
}

// -- Scenario: the documented literal translation -----------------------------

#[test]
fn documented_post_scenario() {
    let r = run(&[
        "--dry-run",
        "--from-curl",
        r#"curl -X POST -H 'Content-Type: application/json' -d '{"k":1}' https://api.example.com/v"#,
    ]);
    assert_exit_code(&r, 0);
    let first = r.stdout.lines().next().unwrap();
    assert_eq!(first, "POST https://api.example.com/v");
    assert!(r.stdout.contains("content-type: application/json"));
    assert!(r.stdout.contains("body: 7 bytes"));
}

// -- Error paths ---------------------------------------------------------------

#[test]
fn cookie_file_rejected() {
    let r = run(&["--dry-run", "--from-curl", "curl -b cookies.txt https://example.com"]);
    assert_exit_code(&r, 1);
    assert_stderr_contains(&r, "cookie files are not supported");
}

#[test]
fn inline_cookie_accepted() {
    let r = run(&["--dry-run", "--from-curl", "curl -b session=abc https://example.com"]);
    assert_exit_code(&r, 0);
    assert!(r.stdout.contains("cookie: session=abc"), "stdout: {}", r.stdout);
}

#[test]
fn unsupported_curl_flag_rejected() {
    let r = run(&["--dry-run", "--from-curl", "curl --retry-all-errors https://example.com"]);
    assert_exit_code(&r, 1);
    assert_stderr_contains(&r, "unsupported curl flag");
}

#[test]
fn unterminated_quote_rejected() {
    let r = run(&["--dry-run", "--from-curl", "curl 'https://example.com"]);
    assert_exit_code(&r, 1);
    assert_stderr_contains(&r, "unterminated");
}

#[test]
fn proto_exclusive_forces_https() {
    let r = run(&["--dry-run", "--from-curl", "curl --proto =https example.com"]);
    assert_exit_code(&r, 0);
    assert!(r.stdout.starts_with("GET https://example.com/"));
}

#[test]
fn proto_disallows_explicit_scheme() {
    let r = run(&["--dry-run", "--from-curl", "curl --proto =https http://example.com"]);
    assert_exit_code(&r, 1);
}

// -- Precedence ----------------------------------------------------------------

#[test]
fn native_flags_win_over_curl() {
    let r = run(&[
        "--dry-run",
        "-m",
        "PATCH",
        "--from-curl",
        "curl -X POST https://example.com",
    ]);
    assert_exit_code(&r, 0);
    assert!(r.stdout.starts_with("PATCH "), "stdout: {}", r.stdout);
}
