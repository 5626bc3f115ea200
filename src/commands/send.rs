//! `send`: SMTP submission.

use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::resolve_password;
use crate::cli::SendArgs;
use crate::error::{FerryError, FerryResult};

pub async fn run(args: SendArgs) -> FerryResult<()> {
    if args.to.is_empty() {
        return Err(FerryError::InvalidInput("at least one --to is required".into()));
    }

    let password = resolve_password(args.smtp_pass.clone(), args.smtp_pass_prompt, "SMTP")?;
    let transport = build_transport(&args, password)?;

    if let Some(raw_file) = &args.raw_file {
        let raw = std::fs::read(raw_file)?;
        let envelope = build_envelope(&args)?;
        transport
            .send_raw(&envelope, &raw)
            .await
            .map_err(|e| FerryError::Smtp(format!("send failed: {}", e)))?;
    } else {
        let message = build_message(&args)?;
        transport
            .send(message)
            .await
            .map_err(|e| FerryError::Smtp(format!("send failed: {}", e)))?;
    }

    info!(recipients = args.to.len(), "message submitted");
    Ok(())
}

fn build_transport(
    args: &SendArgs,
    password: Option<String>,
) -> FerryResult<AsyncSmtpTransport<Tokio1Executor>> {
    let host = args.smtp_host.as_str();
    let mut builder = if args.ssl {
        AsyncSmtpTransport::<Tokio1Executor>::relay(host)
    } else if args.starttls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
    } else {
        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
    }
    .map_err(|e| FerryError::Smtp(format!("transport: {}", e)))?;

    builder = builder.port(args.smtp_port);

    if args.insecure && (args.ssl || args.starttls) {
        let params = TlsParameters::builder(host.to_string())
            .dangerous_accept_invalid_certs(true)
            .dangerous_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| FerryError::Smtp(format!("tls: {}", e)))?;
        builder = builder.tls(if args.ssl {
            Tls::Wrapper(params)
        } else {
            Tls::Required(params)
        });
    }

    if let (Some(user), Some(pass)) = (&args.smtp_user, password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass));
    }

    Ok(builder.build())
}

fn build_envelope(args: &SendArgs) -> FerryResult<Envelope> {
    let from: Mailbox = args
        .from
        .parse()
        .map_err(|e| FerryError::InvalidInput(format!("invalid --from: {}", e)))?;
    let to = args
        .to
        .iter()
        .map(|a| {
            a.parse::<Mailbox>()
                .map(|mb| mb.email)
                .map_err(|e| FerryError::InvalidInput(format!("invalid --to {}: {}", a, e)))
        })
        .collect::<FerryResult<Vec<_>>>()?;
    Envelope::new(Some(from.email), to).map_err(|e| FerryError::Smtp(format!("envelope: {}", e)))
}

fn build_message(args: &SendArgs) -> FerryResult<Message> {
    let body = if let Some(path) = &args.body_file {
        std::fs::read_to_string(path)?
    } else {
        args.body.clone().unwrap_or_default()
    };

    let from: Mailbox = args
        .from
        .parse()
        .map_err(|e| FerryError::InvalidInput(format!("invalid --from: {}", e)))?;

    let mut builder = Message::builder()
        .from(from)
        .header(ContentType::TEXT_PLAIN);
    if let Some(subject) = &args.subject {
        builder = builder.subject(subject.clone());
    }
    for to in &args.to {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| FerryError::InvalidInput(format!("invalid --to {}: {}", to, e)))?;
        builder = builder.to(mailbox);
    }

    builder
        .body(body)
        .map_err(|e| FerryError::Smtp(format!("build message: {}", e)))
}
