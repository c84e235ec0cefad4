use clap::Args;
use merchant_kyc::error::AppError;
use merchant_kyc::workflows::onboarding::{
    write_csv, ApplicationId, BusinessProfile, Caller, DocumentUpload, MemoryObjectStore,
    MemoryStore, OnboardingPorts, OnboardingService, Role, TransitionReceipt, User, UserId,
    WorkflowConfig,
};
use std::sync::Arc;

const DEMO_MERCHANT: &str = "merchant-demo";
const DEMO_REVIEWER: &str = "reviewer-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reject the resubmitted application instead of approving it.
    #[arg(long)]
    pub(crate) reject: bool,
    /// Print the audit trail as CSV after the walkthrough.
    #[arg(long)]
    pub(crate) csv: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { reject, csv } = args;
    let service = demo_service()?;
    let merchant = Caller::merchant(DEMO_MERCHANT);
    let reviewer = Caller::reviewer(DEMO_REVIEWER);

    println!("Merchant onboarding demo");

    let draft = service.create(&merchant, demo_profile())?;
    println!("\nDraft {} created ({})", draft.id, draft.status);

    let document = service.upload_document(
        &merchant,
        DocumentUpload {
            doc_type: "trade_license".to_string(),
            file_name: "trade-license.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.7 demo trade license".to_vec(),
        },
    )?;
    println!(
        "  Attached {} as {} ({} bytes)",
        document.original_name, document.doc_type, document.file_size
    );

    print_receipt("Submitted", &service.submit(&merchant)?);

    let queue = service.list_for_review(&reviewer, Some("pending"))?;
    println!("\nReview queue ({} pending)", queue.len());
    for row in &queue {
        println!(
            "- {} {} <{}> {}",
            row.id,
            row.business_name.as_deref().unwrap_or("(unnamed)"),
            row.email.as_deref().unwrap_or("no email"),
            row.status
        );
    }

    print_receipt(
        "Reviewer requested documents",
        &service.review(
            &reviewer,
            &draft.id,
            "needs_more_docs",
            Some("Please add the owner's passport".to_string()),
        )?,
    );

    service.upload_document(
        &merchant,
        DocumentUpload {
            doc_type: "passport".to_string(),
            file_name: "passport.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![0x89, b'P', b'N', b'G'],
        },
    )?;
    let mut updated = demo_profile();
    updated.contact_phone = Some("+971 4 555 0199".to_string());
    service.edit(&merchant, updated)?;
    println!("\nMerchant uploaded a passport and refreshed contact details");

    print_receipt("Resubmitted", &service.submit(&merchant)?);

    let (decision, comment) = if reject {
        ("rejected", Some("Ownership could not be verified".to_string()))
    } else {
        ("approved", None)
    };
    print_receipt(
        "Final decision",
        &service.review(&reviewer, &draft.id, decision, comment)?,
    );

    print_history(&service, &reviewer, &draft.id, csv)
}

fn demo_service() -> Result<OnboardingService, AppError> {
    let store = Arc::new(MemoryStore::default());
    for (id, email, full_name, role) in [
        (DEMO_MERCHANT, "owner@saffron-trading.example", "Huda Al Mansoori", Role::Merchant),
        (DEMO_REVIEWER, "kyc@acquirer.example", "KYC Desk", Role::Reviewer),
    ] {
        store
            .register_user(User {
                id: UserId(id.to_string()),
                email: email.to_string(),
                full_name: full_name.to_string(),
                role,
            })
            .map_err(|err| AppError::Workflow(err.into()))?;
    }

    let ports = OnboardingPorts::from_memory(store, Arc::new(MemoryObjectStore::default()));
    Ok(OnboardingService::new(ports, WorkflowConfig::default()))
}

fn demo_profile() -> BusinessProfile {
    BusinessProfile {
        business_name: Some("Saffron Trading FZE".to_string()),
        business_category: Some("wholesale".to_string()),
        business_subcategory: Some("spices".to_string()),
        free_zone: true,
        country: Some("AE".to_string()),
        website: Some("https://saffron-trading.example".to_string()),
        business_description: Some("Wholesale spice importer".to_string()),
        monthly_volume: Some("100000-250000".to_string()),
        owner_name: Some("Huda Al Mansoori".to_string()),
        contact_phone: Some("+971 4 555 0142".to_string()),
        contact_address: Some("JAFZA South, Dubai".to_string()),
    }
}

fn print_receipt(label: &str, receipt: &TransitionReceipt) {
    println!("\n{label}: {} is now {}", receipt.application.id, receipt.application.status);
    if let Some(comment) = &receipt.application.reviewer_comment {
        println!("  Reviewer comment: {comment}");
    }
    if let Some(err) = &receipt.audit_error {
        println!("  Audit entry missing: {err}");
    }
}

fn print_history(
    service: &OnboardingService,
    reviewer: &Caller,
    application_id: &ApplicationId,
    csv: bool,
) -> Result<(), AppError> {
    let history = service.history(reviewer, application_id)?;

    if csv {
        println!("\nAudit trail (CSV)");
        write_csv(&history, std::io::stdout().lock())?;
        return Ok(());
    }

    println!("\nAudit trail");
    for entry in &history {
        println!(
            "- {} {} -> {} by {}{}",
            entry.changed_at.format("%Y-%m-%d %H:%M:%S"),
            entry.old_status.map_or("unknown", |status| status.label()),
            entry.new_status,
            entry.changed_by,
            entry
                .comment
                .as_deref()
                .map(|comment| format!(" ({comment})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
