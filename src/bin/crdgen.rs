use anyhow::{Context, Result};
use kube::CustomResourceExt;
use structopt::StructOpt;

use kubesphere_admission::crd::{Policy, PolicyTemplate, Rule};
use kubesphere_admission::notification::{self, WebhookService};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "crdgen",
    about = "Print the CustomResourceDefinitions served by kubesphere-admission"
)]
struct Opt {
    /// Skip the notification-manager CRDs
    #[structopt(long)]
    admission_only: bool,

    /// Namespace of the service serving the notification conversion webhook
    #[structopt(long, default_value = "kubesphere-monitoring-system")]
    webhook_namespace: String,

    /// Name of the service serving the notification conversion webhook
    #[structopt(long, default_value = "notification-manager-webhook")]
    webhook_service: String,

    #[structopt(long)]
    webhook_port: Option<i32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut crds = vec![PolicyTemplate::crd(), Policy::crd(), Rule::crd()];
    if !opt.admission_only {
        let service = WebhookService {
            namespace: opt.webhook_namespace,
            name: opt.webhook_service,
            port: opt.webhook_port,
        };
        crds.extend(notification::crds(&service)?);
    }

    for crd in crds {
        log::debug!("Generating {}", crd.metadata.name.as_deref().unwrap_or_default());
        print!("---\n{}", serde_yaml::to_string(&crd).context("Failed to serialize CRD")?);
    }
    Ok(())
}
