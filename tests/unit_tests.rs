//! Unit tests for slipway's recipe and source validation.
//!
//! These tests exercise pure functions against mock source trees, without
//! a container engine or a toolchain.

mod helpers;

use helpers::{create_server_tree, write_file, TestEnv};
use regex::Regex;
use slipway::config::BuildConfig;
use slipway::recipe::{BuildTarget, Instruction, Recipe};
use slipway::source::SourceTree;
use slipway::BuildError;

// =============================================================================
// Source tree validation
// =============================================================================

#[test]
fn test_valid_tree_yields_one_artifact_path() {
    let env = TestEnv::new();
    create_server_tree(&env.source);

    let source = SourceTree::load(&env.source, None).unwrap();
    let recipe = Recipe::new(&BuildConfig::default(), &source);

    assert_eq!(recipe.artifact.name, "server");
    assert_eq!(
        recipe.artifact.relative,
        "target/x86_64-unknown-linux-musl/release/server"
    );
}

#[test]
fn test_missing_manifest_is_rejected() {
    let env = TestEnv::new();
    write_file(&env.source.join("src/main.rs"), "fn main() {}\n");

    let err = SourceTree::load(&env.source, None).unwrap_err();
    assert!(matches!(err, BuildError::MissingManifest(_)));
}

#[test]
fn test_invalid_manifest_message_names_file() {
    let env = TestEnv::new();
    write_file(&env.source.join("Cargo.toml"), "[package]\nname = server\n");
    write_file(&env.source.join("src/main.rs"), "fn main() {}\n");

    let err = SourceTree::load(&env.source, None).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Cargo.toml"), "{}", msg);
}

#[test]
fn test_custom_triple_changes_every_path() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let config = env.config_with(&[("SLIPWAY_TARGET_TRIPLE", "aarch64-unknown-linux-musl")]);

    let source = SourceTree::load(&env.source, None).unwrap();
    let dockerfile = Recipe::new(&config.build, &source).render();

    assert!(dockerfile.contains("--target aarch64-unknown-linux-musl"));
    assert!(dockerfile.contains("target/aarch64-unknown-linux-musl/release/server"));
    assert!(!dockerfile.contains("x86_64"));
}

// =============================================================================
// Recipe shape
// =============================================================================

#[test]
fn test_both_targets_are_named_stages() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let source = SourceTree::load(&env.source, None).unwrap();
    let dockerfile = Recipe::new(&BuildConfig::default(), &source).render();

    let from = Regex::new(r"(?m)^FROM (\S+) AS (\S+)$").unwrap();
    let stages: Vec<(String, String)> = from
        .captures_iter(&dockerfile)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    assert_eq!(
        stages,
        vec![
            (
                "ekidd/rust-musl-builder:latest".to_string(),
                "dev-image".to_string()
            ),
            ("alpine:latest".to_string(), "minimal-image".to_string()),
        ]
    );
}

#[test]
fn test_sources_owned_by_build_user() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let config = env.config_with(&[
        ("SLIPWAY_BUILD_USER", "builder"),
        ("SLIPWAY_BUILD_GROUP", "staff"),
    ]);
    let source = SourceTree::load(&env.source, None).unwrap();
    let recipe = Recipe::new(&config.build, &source);
    let compile = recipe.stage(BuildTarget::Dev).unwrap();

    let user_idx = compile
        .instructions
        .iter()
        .position(|i| *i == Instruction::User("builder".to_string()))
        .expect("compile stage sets USER");
    let copy_idx = compile
        .instructions
        .iter()
        .position(|i| {
            matches!(i, Instruction::Copy { chown: Some(c), .. } if c == "builder:staff")
        })
        .expect("sources copied with --chown");
    let run_idx = compile
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::Run(_)))
        .unwrap();

    // The build runs as the same non-root identity that owns the sources.
    assert!(user_idx < run_idx);
    assert!(copy_idx < run_idx);
}

#[test]
fn test_minimal_image_copies_only_the_artifact() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let source = SourceTree::load(&env.source, None).unwrap();
    let dockerfile = Recipe::new(&BuildConfig::default(), &source).render();

    let package = dockerfile
        .split("AS minimal-image")
        .nth(1)
        .expect("package stage rendered");
    let copy = Regex::new(r"(?m)^COPY --from=dev-image (\S+) (\S+)$").unwrap();
    let copies: Vec<_> = copy.captures_iter(package).collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(
        &copies[0][1],
        "/home/rust/src/target/x86_64-unknown-linux-musl/release/server"
    );
    assert_eq!(&copies[0][2], "/usr/local/bin/server");
    assert!(!package.contains("cargo"));
    assert!(package.contains("ca-certificates"));
}

#[test]
fn test_server_binary_default_command() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let source = SourceTree::load(&env.source, None).unwrap();
    let dockerfile = Recipe::new(&BuildConfig::default(), &source).render();

    assert!(dockerfile.ends_with("CMD [\"/usr/local/bin/server\"]\n"));
    assert!(dockerfile.contains("CMD [\"./target/x86_64-unknown-linux-musl/release/server\"]\n"));
}

#[test]
fn test_render_is_deterministic() {
    let env = TestEnv::new();
    create_server_tree(&env.source);
    let source = SourceTree::load(&env.source, None).unwrap();
    let a = Recipe::new(&BuildConfig::default(), &source).render();
    let b = Recipe::new(&BuildConfig::default(), &source).render();
    assert_eq!(a, b);
}
