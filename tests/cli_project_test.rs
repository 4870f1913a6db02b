//! Integration tests for system init, projects, documents, and questions.
//!
//! Covers slug allocation through the CLI: normalization, collision
//! suffixes, the empty-name fallback, and namespace independence.

mod common;

use common::TestEnv;
use predicates::prelude::*;

// === Init Tests ===

#[test]
fn test_init_creates_storage() {
    let env = TestEnv::new();

    env.scl()
        .args(["system", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("data_dir"));
}

#[test]
fn test_init_human_readable() {
    let env = TestEnv::new();

    env.scl()
        .args(["system", "init", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized scrumline"));
}

#[test]
fn test_commands_require_init() {
    let env = TestEnv::new();

    env.scl()
        .args(["project", "create", "Website"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("system init"));
}

// === Project Tests ===

#[test]
fn test_project_create_allocates_slug() {
    let env = TestEnv::init();

    let project = env.scl_json(&["project", "create", "Website Redesign"]);
    assert_eq!(project["slug"], "website-redesign");
    assert_eq!(project["name"], "Website Redesign");
}

#[test]
fn test_project_duplicate_name_rejected() {
    let env = TestEnv::init();

    env.scl()
        .args(["project", "create", "Website"])
        .assert()
        .success();
    env.scl()
        .args(["project", "create", "Website"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_project_slug_collision_gets_suffix() {
    let env = TestEnv::init();

    // Different names, same normalization.
    let first = env.scl_json(&["project", "create", "My Project"]);
    let second = env.scl_json(&["project", "create", "my project!"]);
    assert_eq!(first["slug"], "my-project");
    assert_eq!(second["slug"], "my-project-1");
}

#[test]
fn test_project_unnormalizable_name_falls_back() {
    let env = TestEnv::init();

    let project = env.scl_json(&["project", "create", "!!!"]);
    assert_eq!(project["slug"], "null");
}

#[test]
fn test_project_show_and_list() {
    let env = TestEnv::init();

    env.scl()
        .args(["project", "create", "Alpha"])
        .assert()
        .success();
    env.scl()
        .args(["project", "create", "Beta"])
        .assert()
        .success();

    let shown = env.scl_json(&["project", "show", "alpha"]);
    assert_eq!(shown["name"], "Alpha");

    let listed = env.scl_json(&["project", "list"]);
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[test]
fn test_project_show_unknown_slug_fails() {
    let env = TestEnv::init();

    env.scl()
        .args(["project", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_json_error_output_escapes_quotes() {
    let env = TestEnv::init();

    // The slug is echoed back in the not-found message; a double quote in
    // it must not break the JSON error object.
    let assert = env
        .scl()
        .args(["project", "show", "no\"such"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    let line = stderr.lines().last().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
    assert!(parsed["error"].as_str().unwrap().contains("no\"such"));
}

#[test]
fn test_project_human_output() {
    let env = TestEnv::init();

    env.scl()
        .args(["project", "create", "Alpha", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alpha (alpha)"));
}

// === Document and Question Tests ===

#[test]
fn test_doc_and_question_slugs_are_independent_namespaces() {
    let env = TestEnv::init();

    env.scl()
        .args(["project", "create", "Alpha"])
        .assert()
        .success();

    // The same token in three namespaces never needs a suffix.
    let doc = env.scl_json(&["doc", "create", "alpha", "Roadmap"]);
    let question = env.scl_json(&["question", "create", "alpha", "Roadmap"]);
    assert_eq!(doc["slug"], "roadmap");
    assert_eq!(question["slug"], "roadmap");

    // A second document with the same title does.
    let second_doc = env.scl_json(&["doc", "create", "alpha", "Roadmap"]);
    assert_eq!(second_doc["slug"], "roadmap-1");
}
