// ********* Form schema ***********

use std::error::Error;
use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::FormState;

/// Version of the column layout below. Bump it whenever `HEADERS` changes so that
/// the sheet backend and the form can be checked against each other.
pub const SCHEMA_VERSION: u32 = 2;

/// Sentinel written for questions that do not apply to the applicant.
pub const NOT_APPLICABLE: &str = "N/A";

/// Interval between the submission and the date an initial response is due.
pub const RESPONSE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEVICE_TYPE_MOBILE: &str = "mobile devices (smartphone, tablet or hybrid)";
pub const DEVICE_TYPE_COMPUTER: &str = "computer (desktop or laptop)";

/// Name of the hidden field used to trap automated submissions.
/// It never appears in a step, in the sheet, or in a draft.
pub const HONEYPOT_NAME: &str = "Website";

/// Name under which the human verification token travels.
pub const TOKEN_NAME: &str = "g-recaptcha-response";

pub const DEVICE_COUNT_MESSAGE: &str = "You are planning to use two or more devices. Please change this value back to one and submit separate applications for each device.";

pub const VERIFICATION_MESSAGE: &str = "Please complete the verification check before submitting.";

pub const SUBMISSION_ID_HEADER: &str = "Submission_ID";
pub const SUBMISSION_TIMESTAMP_HEADER: &str = "Submission_Timestamp_ISO";
pub const RESPONSE_DUE_HEADER: &str = "Response_Due_Date_ISO";

/// The columns of the response sheet, in order.
pub const HEADERS: [&str; 37] = [
    SUBMISSION_ID_HEADER,
    SUBMISSION_TIMESTAMP_HEADER,
    RESPONSE_DUE_HEADER,
    "IP_Address",
    "Full_Name",
    "CA_Email",
    "Contact_Email",
    "Contact_Number",
    "Preferred_Contact_Method",
    "Reason_for_BYOD",
    "Device_Type",
    "Device_Count",
    "Device_Model_Name",
    "OS_and_Version",
    "Web_Browser_and_Version",
    "Malware_Protection_Software",
    "Email_Client_Used",
    "Office_Apps_Used",
    "Software_Firewall_Assurance",
    "Uninstall_Unused_Apps",
    "Remove_Unused_Accounts",
    "Strong_Passwords_MFA_Assurance",
    "Device_Lock_Assurance",
    "Separate_User_Account_Assurance",
    "Update_Devices",
    "Supported_Licensed",
    "In_Scope",
    "Automatic_Updates",
    "Anti_Malware_All",
    "Antimalware_Updates",
    "Antimalware_Scans",
    "Antimalware_Web_Protection",
    "Personalised_Help",
    "Comments_Feedback",
    "Acknowledge_Policy_Compliance",
    "Acknowledge_Security_Risks",
    "Acknowledge_Security_Measures",
];

pub fn expected_headers() -> Vec<String> {
    HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Every question of the form.
///
/// The order of the variants is the order of `FIELD_SPECS`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Field {
    IpAddress,
    FullName,
    CaEmail,
    ContactEmail,
    ContactNumber,
    PreferredContactMethod,
    ReasonForByod,
    DeviceType,
    DeviceCount,
    DeviceModelName,
    OsAndVersion,
    WebBrowserAndVersion,
    MalwareProtectionSoftware,
    EmailClientUsed,
    OfficeAppsUsed,
    SoftwareFirewallAssurance,
    UninstallUnusedApps,
    RemoveUnusedAccounts,
    StrongPasswordsMfaAssurance,
    DeviceLockAssurance,
    SeparateUserAccountAssurance,
    UpdateDevices,
    SupportedLicensed,
    InScope,
    AutomaticUpdates,
    AntiMalwareAll,
    AntimalwareUpdates,
    AntimalwareScans,
    AntimalwareWebProtection,
    PersonalisedHelp,
    CommentsFeedback,
    AcknowledgePolicyCompliance,
    AcknowledgeSecurityRisks,
    AcknowledgeSecurityMeasures,
}

impl Field {
    pub const ALL: [Field; 34] = [
        Field::IpAddress,
        Field::FullName,
        Field::CaEmail,
        Field::ContactEmail,
        Field::ContactNumber,
        Field::PreferredContactMethod,
        Field::ReasonForByod,
        Field::DeviceType,
        Field::DeviceCount,
        Field::DeviceModelName,
        Field::OsAndVersion,
        Field::WebBrowserAndVersion,
        Field::MalwareProtectionSoftware,
        Field::EmailClientUsed,
        Field::OfficeAppsUsed,
        Field::SoftwareFirewallAssurance,
        Field::UninstallUnusedApps,
        Field::RemoveUnusedAccounts,
        Field::StrongPasswordsMfaAssurance,
        Field::DeviceLockAssurance,
        Field::SeparateUserAccountAssurance,
        Field::UpdateDevices,
        Field::SupportedLicensed,
        Field::InScope,
        Field::AutomaticUpdates,
        Field::AntiMalwareAll,
        Field::AntimalwareUpdates,
        Field::AntimalwareScans,
        Field::AntimalwareWebProtection,
        Field::PersonalisedHelp,
        Field::CommentsFeedback,
        Field::AcknowledgePolicyCompliance,
        Field::AcknowledgeSecurityRisks,
        Field::AcknowledgeSecurityMeasures,
    ];

    /// The column name of this field in the response sheet.
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Field> {
        FIELD_SPECS.iter().find(|s| s.name == name).map(|s| s.field)
    }

    pub fn spec(&self) -> &'static FieldSpec {
        &FIELD_SPECS[*self as usize]
    }
}

/// The value held by a field.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Choice(String),
    Flag(bool),
}

impl FieldValue {
    /// The content of the value, as written in a sheet cell.
    pub fn cell(&self) -> String {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Flag(b) => b.to_string(),
        }
    }
}

const YES_NO: &[&str] = &["Yes", "No"];
const YES_NO_NA: &[&str] = &["Yes", "No", NOT_APPLICABLE];
const CONTACT_METHODS: &[&str] = &["CA_Email", "Contact_Email", "Contact_Number"];
const DEVICE_TYPES: &[&str] = &[DEVICE_TYPE_MOBILE, DEVICE_TYPE_COMPUTER];

/// The declarative constraint attached to a field.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Rule {
    /// Free text, with bounds on the trimmed length (in characters).
    Text { min: usize, max: usize },
    Email { max: usize },
    Integer { min: i64 },
    /// A UK landline or mobile number.
    UkPhone,
    OneOf(&'static [&'static str]),
    /// Consent checkboxes.
    MustBeTrue,
    /// Free text that may be left empty.
    Optional,
    /// Filled in by the form itself, never checked.
    Hidden,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub name: &'static str,
    pub rule: Rule,
    /// Reason reported when the rule fails.
    pub message: &'static str,
    /// Value written to the sheet when the field was never answered.
    pub default: Option<&'static str>,
}

const fn spec(
    field: Field,
    name: &'static str,
    rule: Rule,
    message: &'static str,
    default: Option<&'static str>,
) -> FieldSpec {
    FieldSpec {
        field,
        name,
        rule,
        message,
        default,
    }
}

const SELECT: &str = "Please select an option.";
const TEXT_255: Rule = Rule::Text { min: 2, max: 255 };

pub const FIELD_SPECS: [FieldSpec; 34] = [
    spec(Field::IpAddress, "IP_Address", Rule::Hidden, "", Some("Unavailable")),
    spec(
        Field::FullName,
        "Full_Name",
        TEXT_255,
        "Full name must be at least 2 characters.",
        None,
    ),
    spec(
        Field::CaEmail,
        "CA_Email",
        Rule::Email { max: 255 },
        "Invalid email address.",
        None,
    ),
    spec(
        Field::ContactEmail,
        "Contact_Email",
        Rule::Email { max: 255 },
        "Invalid email address.",
        None,
    ),
    spec(
        Field::ContactNumber,
        "Contact_Number",
        Rule::UkPhone,
        "Please enter a valid UK phone number.",
        None,
    ),
    spec(
        Field::PreferredContactMethod,
        "Preferred_Contact_Method",
        Rule::OneOf(CONTACT_METHODS),
        "Please select a preferred contact method.",
        None,
    ),
    spec(
        Field::ReasonForByod,
        "Reason_for_BYOD",
        Rule::Text { min: 5, max: 2000 },
        "Please provide a brief reason (min 5 characters).",
        None,
    ),
    spec(
        Field::DeviceType,
        "Device_Type",
        Rule::OneOf(DEVICE_TYPES),
        "Please select a device type.",
        None,
    ),
    spec(
        Field::DeviceCount,
        "Device_Count",
        Rule::Integer { min: 1 },
        "Must be at least 1.",
        None,
    ),
    spec(
        Field::DeviceModelName,
        "Device_Model_Name",
        TEXT_255,
        "Please enter a device model.",
        None,
    ),
    spec(
        Field::OsAndVersion,
        "OS_and_Version",
        TEXT_255,
        "Please enter OS and version.",
        None,
    ),
    spec(
        Field::WebBrowserAndVersion,
        "Web_Browser_and_Version",
        TEXT_255,
        "Please enter browser and version.",
        None,
    ),
    spec(
        Field::MalwareProtectionSoftware,
        "Malware_Protection_Software",
        TEXT_255,
        "Please enter malware protection software.",
        None,
    ),
    spec(
        Field::EmailClientUsed,
        "Email_Client_Used",
        TEXT_255,
        "Please enter email client.",
        None,
    ),
    spec(
        Field::OfficeAppsUsed,
        "Office_Apps_Used",
        TEXT_255,
        "Please enter office apps used.",
        None,
    ),
    spec(
        Field::SoftwareFirewallAssurance,
        "Software_Firewall_Assurance",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::UninstallUnusedApps,
        "Uninstall_Unused_Apps",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::RemoveUnusedAccounts,
        "Remove_Unused_Accounts",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::StrongPasswordsMfaAssurance,
        "Strong_Passwords_MFA_Assurance",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::DeviceLockAssurance,
        "Device_Lock_Assurance",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::SeparateUserAccountAssurance,
        "Separate_User_Account_Assurance",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::UpdateDevices,
        "Update_Devices",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::SupportedLicensed,
        "Supported_Licensed",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(Field::InScope, "In_Scope", Rule::OneOf(YES_NO), SELECT, None),
    spec(
        Field::AutomaticUpdates,
        "Automatic_Updates",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::AntiMalwareAll,
        "Anti_Malware_All",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::AntimalwareUpdates,
        "Antimalware_Updates",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::AntimalwareScans,
        "Antimalware_Scans",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::AntimalwareWebProtection,
        "Antimalware_Web_Protection",
        Rule::OneOf(YES_NO_NA),
        SELECT,
        Some(NOT_APPLICABLE),
    ),
    spec(
        Field::PersonalisedHelp,
        "Personalised_Help",
        Rule::OneOf(YES_NO),
        SELECT,
        None,
    ),
    spec(
        Field::CommentsFeedback,
        "Comments_Feedback",
        Rule::Optional,
        "",
        Some(""),
    ),
    spec(
        Field::AcknowledgePolicyCompliance,
        "Acknowledge_Policy_Compliance",
        Rule::MustBeTrue,
        "You must agree to comply with the policy.",
        Some("false"),
    ),
    spec(
        Field::AcknowledgeSecurityRisks,
        "Acknowledge_Security_Risks",
        Rule::MustBeTrue,
        "You must acknowledge the security risks.",
        Some("false"),
    ),
    spec(
        Field::AcknowledgeSecurityMeasures,
        "Acknowledge_Security_Measures",
        Rule::MustBeTrue,
        "You must consent to necessary security measures.",
        Some("false"),
    ),
];

// ********* Steps **********

/// Decides, for the current state of the form, whether a field is left out of a step.
pub type Exclusion = fn(&FormState) -> bool;

#[derive(Clone, Copy)]
pub struct StepDefinition {
    /// 1-indexed position of the step.
    pub index: usize,
    pub title: &'static str,
    pub required_fields: &'static [Field],
    /// A field listed here is not validated when its predicate holds.
    pub conditional_exclusions: &'static [(Field, Exclusion)],
    /// The step can only be left once a human verification token is present.
    pub requires_verification: bool,
}

impl std::fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("index", &self.index)
            .field("title", &self.title)
            .finish()
    }
}

/// The separate user account question only makes sense on a computer.
pub fn not_a_computer(state: &FormState) -> bool {
    state.choice(Field::DeviceType) != Some(DEVICE_TYPE_COMPUTER)
}

pub const STEPS: [StepDefinition; 6] = [
    StepDefinition {
        index: 1,
        title: "Your Details",
        required_fields: &[
            Field::FullName,
            Field::CaEmail,
            Field::ContactEmail,
            Field::ContactNumber,
            Field::PreferredContactMethod,
        ],
        conditional_exclusions: &[],
        requires_verification: false,
    },
    StepDefinition {
        index: 2,
        title: "Your Device",
        required_fields: &[
            Field::ReasonForByod,
            Field::DeviceType,
            Field::DeviceCount,
            Field::DeviceModelName,
            Field::OsAndVersion,
            Field::WebBrowserAndVersion,
        ],
        conditional_exclusions: &[],
        requires_verification: false,
    },
    StepDefinition {
        index: 3,
        title: "Software Setup",
        required_fields: &[
            Field::MalwareProtectionSoftware,
            Field::EmailClientUsed,
            Field::OfficeAppsUsed,
        ],
        conditional_exclusions: &[],
        requires_verification: false,
    },
    StepDefinition {
        index: 4,
        title: "Security Measures",
        required_fields: &[
            Field::SoftwareFirewallAssurance,
            Field::UninstallUnusedApps,
            Field::RemoveUnusedAccounts,
            Field::StrongPasswordsMfaAssurance,
            Field::DeviceLockAssurance,
            Field::SeparateUserAccountAssurance,
            Field::UpdateDevices,
            Field::SupportedLicensed,
            Field::InScope,
            Field::AutomaticUpdates,
            Field::AntiMalwareAll,
            Field::AntimalwareUpdates,
            Field::AntimalwareScans,
            Field::AntimalwareWebProtection,
        ],
        conditional_exclusions: &[(
            Field::SeparateUserAccountAssurance,
            not_a_computer as Exclusion,
        )],
        requires_verification: false,
    },
    StepDefinition {
        index: 5,
        title: "Final Thoughts & Consent",
        required_fields: &[
            Field::PersonalisedHelp,
            Field::CommentsFeedback,
            Field::AcknowledgePolicyCompliance,
            Field::AcknowledgeSecurityRisks,
            Field::AcknowledgeSecurityMeasures,
        ],
        conditional_exclusions: &[],
        requires_verification: false,
    },
    StepDefinition {
        index: 6,
        title: "Verification",
        required_fields: &[],
        conditional_exclusions: &[],
        requires_verification: true,
    },
];

pub const TOTAL_STEPS: usize = STEPS.len();

/// The definition of a 1-indexed step.
pub fn step(index: usize) -> Option<&'static StepDefinition> {
    if index == 0 {
        None
    } else {
        STEPS.get(index - 1)
    }
}

// ********* Errors **********

/// Errors raised while building a form from raw answers.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum FormError {
    UnknownField(String),
}

impl Error for FormError {}

impl Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::UnknownField(name) => write!(f, "Unknown form field: {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_specs_follow_variant_order() {
        for (idx, field) in Field::ALL.iter().enumerate() {
            assert_eq!(FIELD_SPECS[idx].field, *field);
            assert_eq!(Field::from_name(field.name()), Some(*field));
        }
    }

    #[test]
    fn every_field_has_a_column() {
        for field in Field::ALL.iter() {
            assert!(HEADERS.contains(&field.name()), "{:?}", field);
        }
        assert!(!HEADERS.contains(&HONEYPOT_NAME));
    }

    #[test]
    fn steps_are_numbered_in_order() {
        for (idx, s) in STEPS.iter().enumerate() {
            assert_eq!(s.index, idx + 1);
        }
        assert!(step(0).is_none());
        assert_eq!(step(TOTAL_STEPS).map(|s| s.title), Some("Verification"));
        assert!(step(TOTAL_STEPS + 1).is_none());
    }
}
