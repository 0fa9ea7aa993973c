//! CLI behavior that needs no network: provider listing, validation
//! failures and exit-code mapping.

use assert_cmd::Command;
use predicates::prelude::*;

fn companyatlas() -> Command {
    #[allow(clippy::expect_used)]
    let cmd = Command::cargo_bin("companyatlas").expect("binary builds");
    cmd
}

#[test]
fn providers_lists_bundled_sources() {
    companyatlas()
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("recherche_entreprises"))
        .stdout(predicate::str::contains("insee"))
        .stdout(predicate::str::contains("bodacc"))
        .stdout(predicate::str::contains("pappers"));
}

#[test]
fn providers_marks_missing_configuration() {
    companyatlas()
        .arg("providers")
        .env_remove("PAPPERS_API_KEY")
        .assert()
        .success()
        .stdout(predicate::str::contains("missing config"))
        .stdout(predicate::str::contains("PAPPERS_API_KEY"));
}

#[test]
fn lookup_rejects_invalid_identifier_before_any_request() {
    companyatlas()
        .args(["lookup", "not-a-siren", "--country", "FR"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid identifier"));
}

#[test]
fn lookup_requires_country_for_ambiguous_identifier() {
    // Luhn-valid 9 digits: SIREN in France, EIN in the US.
    companyatlas()
        .args(["lookup", "552032534"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ambiguous identifier"));
}
