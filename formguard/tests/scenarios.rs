//! End-to-end scenarios on a sign-up form.

use std::collections::HashSet;
use std::time::Duration;

use formguard::prelude::*;

struct SignUp {
    form: Form,
    username: Arc<TextInput>,
    password: Arc<TextInput>,
    password_confirm: Arc<TextInput>,
    _groups: Vec<RuleGroup>,
}

fn sign_up(taken: &[&str]) -> SignUp {
    let form = Form::new();

    let username = Arc::new(TextInput::new("username").required().min_length(3));
    let password = Arc::new(
        TextInput::new("password")
            .input_type(InputType::Password)
            .required()
            .pattern(".{5,}")
            .unwrap(),
    );
    let password_confirm = Arc::new(
        TextInput::new("passwordConfirm")
            .input_type(InputType::Password)
            .required(),
    );
    form.add_input(&username);
    form.add_input(&password);
    form.add_input(&password_confirm);

    let taken: Arc<HashSet<String>> = Arc::new(taken.iter().map(|s| s.to_string()).collect());
    let check = move |value: String| {
        let taken = Arc::clone(&taken);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, RuleError>(!taken.contains(&value.to_lowercase()))
        }
    };

    let username_rules = RuleGroup::for_field("username")
        .rule(Rule::when("tooShort").unwrap().message("Too short"))
        .rule(Rule::when("*").unwrap())
        .rule(Rule::async_then(check, |available| {
            Some(if available {
                Feedback::info("Username available")
            } else {
                Feedback::error("Username already taken, choose another")
            })
        }))
        .rule(Rule::when("valid").unwrap().message("Looks good!"))
        .attach(&form);

    let password_rules = RuleGroup::for_field("password")
        .rule(Rule::constraint(Constraint::ValueMissing))
        .rule(Rule::constraint(Constraint::PatternMismatch).message("Should be at least 5 characters long"))
        .rule(
            Rule::predicate(|v| !v.chars().any(|c| c.is_ascii_digit()))
                .warning()
                .message("Should contain numbers"),
        )
        .rule(
            Rule::predicate(|v| !v.chars().any(|c| c.is_ascii_lowercase()))
                .warning()
                .message("Should contain small letters"),
        )
        .rule(
            Rule::predicate(|v| !v.chars().any(|c| c.is_ascii_uppercase()))
                .warning()
                .message("Should contain capital letters"),
        )
        .rule(Rule::valid().message("Looks good!"))
        .linked("passwordConfirm")
        .attach(&form);

    let source = Arc::clone(&password);
    let confirm_rules = RuleGroup::for_field("passwordConfirm")
        .rule(Rule::any())
        .rule(Rule::predicate(move |v| v != source.value()).message("Not the same password"))
        .rule(Rule::valid().message("Looks good!"))
        .attach(&form);

    SignUp {
        form,
        username,
        password,
        password_confirm,
        _groups: vec![username_rules, password_rules, confirm_rules],
    }
}

fn fired(validation: &FieldValidation) -> Vec<(FeedbackKind, String)> {
    validation
        .applicable()
        .map(|o| (o.kind, o.message.clone().unwrap_or_default()))
        .collect()
}

#[tokio::test]
async fn test_username_too_short() {
    let s = sign_up(&["john", "paul", "george", "ringo"]);
    s.username.set_value("jo");

    let results = s.form.field_changed(&s.username).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(fired(&results[0]), vec![(FeedbackKind::Error, "Too short".to_string())]);
    assert!(!s.form.is_valid());
}

#[tokio::test]
async fn test_username_taken() {
    let s = sign_up(&["zzz"]);
    s.username.set_value("zzz");

    let results = s.form.field_changed(&s.username).await.unwrap();

    assert_eq!(
        fired(&results[0]),
        vec![(
            FeedbackKind::Error,
            "Username already taken, choose another".to_string()
        )]
    );
    assert!(!results[0].is_valid());
    assert!(!s.form.is_valid());
}

#[tokio::test]
async fn test_username_available() {
    let s = sign_up(&["john"]);
    s.username.set_value("zzz");

    let results = s.form.field_changed(&s.username).await.unwrap();

    assert_eq!(
        fired(&results[0]),
        vec![
            (FeedbackKind::Info, "Username available".to_string()),
            (FeedbackKind::WhenValid, "Looks good!".to_string()),
        ]
    );
    assert!(s.form.is_valid());

    let entry = s.form.field("username").unwrap();
    assert!(entry.errors.is_empty());
    assert_eq!(entry.infos.len(), 1);
}

#[tokio::test]
async fn test_password_warnings_and_linked_confirmation() {
    let s = sign_up(&[]);
    s.password_confirm.set_value("secret");
    s.password.set_value("Secret1");

    let results = s.form.field_changed(&s.password).await.unwrap();
    let names: Vec<&str> = results.iter().map(|v| v.field_name.as_str()).collect();
    assert_eq!(names, vec!["password", "passwordConfirm"]);

    assert_eq!(
        fired(&results[0]),
        vec![(FeedbackKind::WhenValid, "Looks good!".to_string())]
    );
    assert_eq!(
        fired(&results[1]),
        vec![(FeedbackKind::Error, "Not the same password".to_string())]
    );

    s.password_confirm.set_value("Secret1");
    s.form.field_changed(&s.password_confirm).await.unwrap();
    assert!(s.form.is_valid());
}

#[tokio::test]
async fn test_short_password_still_gets_warnings() {
    let s = sign_up(&[]);
    s.password.set_value("abc");

    let results = s.form.validate_fields(["password"]).await.unwrap();

    assert_eq!(
        fired(&results[0]),
        vec![
            (
                FeedbackKind::Error,
                "Should be at least 5 characters long".to_string()
            ),
            (FeedbackKind::Warning, "Should contain numbers".to_string()),
            (
                FeedbackKind::Warning,
                "Should contain capital letters".to_string()
            ),
        ]
    );

    let entry = s.form.field("password").unwrap();
    assert_eq!(entry.errors.len(), 1);
    assert_eq!(entry.warnings.len(), 2);
    assert!(entry.infos.is_empty());
}

#[tokio::test]
async fn test_submit_validates_untouched_fields() {
    let s = sign_up(&[]);
    assert!(s.form.is_valid());

    let valid = s.form.submit().await.unwrap();

    assert!(!valid);
    for name in ["username", "password", "passwordConfirm"] {
        assert!(s.form.has_errors(&[name]), "{name} should have an error");
    }
}

#[tokio::test]
async fn test_fields_snapshot_serializes() {
    let s = sign_up(&[]);
    s.username.set_value("jo");
    s.form.field_changed(&s.username).await.unwrap();

    let json = serde_json::to_value(s.form.fields_snapshot()).unwrap();
    assert_eq!(json[0]["name"], "username");
    assert_eq!(json[0]["dirty"], false);
    assert_eq!(json[0]["errors"][0]["index"], 0);
}
