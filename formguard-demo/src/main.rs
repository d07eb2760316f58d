//! Sign-up form walkthrough.
//!
//! Types values into a username / password / confirmation form one change at
//! a time and prints the feedback each change produces. Debug logs go to
//! `formguard-demo.log`.

use std::collections::HashSet;
use std::error::Error;
use std::fs::File;
use std::time::Duration;

use formguard::prelude::*;
use simplelog::{Config, LevelFilter, WriteLogger};

const TAKEN_USERNAMES: [&str; 4] = ["john", "paul", "george", "ringo"];

/// Pretend to ask a server whether `username` is free.
async fn check_availability(taken: Arc<HashSet<String>>, username: String) -> Result<bool, RuleError> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(!taken.contains(&username.to_lowercase()))
}

fn print_feedback(validation: &FieldValidation) {
    let fired: Vec<&Outcome> = validation.applicable().collect();
    if fired.is_empty() {
        println!("    {:<16} (no feedback)", validation.field_name);
        return;
    }
    for outcome in fired {
        let label = match outcome.kind {
            FeedbackKind::Error => "error",
            FeedbackKind::Warning => "warning",
            FeedbackKind::Info => "info",
            FeedbackKind::WhenValid => "valid",
        };
        println!(
            "    {:<16} {:<8} {}",
            validation.field_name,
            label,
            outcome.message.as_deref().unwrap_or("")
        );
    }
}

struct SignUp {
    form: Form,
    username: Arc<TextInput>,
    password: Arc<TextInput>,
    password_confirm: Arc<TextInput>,
    _groups: Vec<RuleGroup>,
}

impl SignUp {
    fn build() -> Result<Self, Box<dyn Error>> {
        let form = Form::new();

        let username = Arc::new(TextInput::new("username").required().min_length(3));
        let password = Arc::new(
            TextInput::new("password")
                .input_type(InputType::Password)
                .required()
                .pattern(".{5,}")?,
        );
        let password_confirm = Arc::new(
            TextInput::new("passwordConfirm")
                .input_type(InputType::Password)
                .required(),
        );
        form.add_input(&username);
        form.add_input(&password);
        form.add_input(&password_confirm);

        let taken: Arc<HashSet<String>> =
            Arc::new(TAKEN_USERNAMES.iter().map(|s| s.to_string()).collect());

        let username_rules = RuleGroup::for_field("username")
            .rule(Rule::when("tooShort")?.message("Too short"))
            .rule(Rule::when("*")?)
            .rule(Rule::async_then(
                move |value| check_availability(Arc::clone(&taken), value),
                |available| {
                    Some(if available {
                        Feedback::info("Username available")
                    } else {
                        Feedback::error("Username already taken, choose another")
                    })
                },
            ))
            .rule(Rule::when("valid")?.message("Looks good!"))
            .attach(&form);

        let password_rules = RuleGroup::for_field("password")
            .rule(Rule::when("valueMissing")?)
            .rule(Rule::when("patternMismatch")?.message("Should be at least 5 characters long"))
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
            .rule(
                Rule::predicate(|v| !v.chars().any(|c| !c.is_ascii_alphanumeric()))
                    .warning()
                    .message("Should contain special characters"),
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

        Ok(Self {
            form,
            username,
            password,
            password_confirm,
            _groups: vec![username_rules, password_rules, confirm_rules],
        })
    }

    /// Type `value` into `input` and show what the form says about it.
    async fn type_into(&self, input: &Arc<TextInput>, value: &str) {
        println!("{} <- {:?}", input.name(), value);
        input.set_value(value);
        match self.form.field_changed(input).await {
            Ok(validations) => validations.iter().for_each(print_feedback),
            Err(e) => {
                eprintln!("    validation failed: {e}");
                e.validations().iter().for_each(print_feedback);
            }
        }
        println!(
            "    form valid: {}, has feedback: {}",
            self.form.is_valid(),
            self.form.has_feedbacks()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_file = File::create("formguard-demo.log")?;
    WriteLogger::init(LevelFilter::Debug, Config::default(), log_file)?;

    let sign_up = SignUp::build()?;
    let tracker = StatusTracker::attach(&sign_up.form);

    println!("Submitting the empty form");
    let valid = sign_up.form.submit().await?;
    println!("    form valid: {valid}\n");

    sign_up.type_into(&sign_up.username, "jo").await;
    sign_up.type_into(&sign_up.username, "john").await;
    sign_up.type_into(&sign_up.username, "zzz").await;
    println!();

    sign_up.type_into(&sign_up.password, "abc").await;
    sign_up.type_into(&sign_up.password, "Secret1!").await;
    sign_up.type_into(&sign_up.password_confirm, "Secret1").await;
    sign_up.type_into(&sign_up.password_confirm, "Secret1!").await;
    println!();

    for name in ["username", "password", "passwordConfirm"] {
        println!("{name}: {:?}", tracker.status(name));
    }

    println!("\nRegistry:");
    println!("{}", serde_json::to_string_pretty(&sign_up.form.fields_snapshot())?);

    let valid = sign_up.form.submit().await?;
    println!("\nSubmitted, form valid: {valid}");

    sign_up.form.reset();
    println!("After reset, has feedback: {}", sign_up.form.has_feedbacks());

    Ok(())
}
