use anyhow::{Context, Result};
use clap::Parser;
use fleet_provisioning::{
    ca,
    cli::{Args, CsrSource},
    config::Config,
    telemetry, ExchangeRouter, MqttTransport, ProvisioningSequencer, SequencerSettings, Transport,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse and check arguments before touching the network
    dotenvy::dotenv().ok();
    let invocation = Args::parse().validate().unwrap_or_else(|e| e.exit());

    // 2. Load configuration and initialize logging
    let mut config = Config::load(invocation.config.as_deref())?;
    if let Some(output_dir) = &invocation.output_dir {
        config.provisioning.output_dir = output_dir.clone();
    }
    telemetry::init_logging(&config.logging)?;
    info!("Starting provisioning...");

    // 3. Load or generate the CSR
    let signing_request = match &invocation.csr {
        CsrSource::File(path) => ca::load_csr(path).await?,
        CsrSource::Generate => ca::generate_csr(&invocation.request.client_token)?,
    };

    // 4. Build the transport and sequencer around a shared router
    let router = Arc::new(ExchangeRouter::new());
    let transport = MqttTransport::new(invocation.connection.clone(), config.mqtt.clone(), router.clone());
    let settings = SequencerSettings {
        response_timeout: config.provisioning.response_timeout(),
        output_dir: config.provisioning.output_dir.clone(),
        test_topic: config.provisioning.test_topic.clone(),
        test_message: config.provisioning.test_message.clone(),
    };
    let mut sequencer = ProvisioningSequencer::new(transport, router, invocation.request, settings)
        .with_local_private_key(signing_request.private_key_pem);

    // 5. Certificate and registration over the bootstrap connection
    sequencer
        .connect(&invocation.bootstrap)
        .await
        .context("Failed to connect with bootstrap credentials")?;
    let outcome = provision(&mut sequencer, &signing_request.csr_pem).await;
    sequencer.disconnect().await?;

    if let Err(e) = outcome {
        error!("Provisioning failed: {}", e);
        return Err(e).context("Provisioning failed");
    }

    // 6. Reconnect with the issued certificate
    let issued = sequencer
        .connect_with_issued_credentials(&invocation.root_ca)
        .await
        .context("Failed to connect with the issued certificate")?;
    sequencer.disconnect().await?;

    info!(
        "Provisioning complete: certificate {} key {}",
        issued.certificate.display(),
        issued.private_key.display()
    );
    Ok(())
}

/// Subscribe, sign the CSR and register the thing
async fn provision<T: Transport>(
    sequencer: &mut ProvisioningSequencer<T>,
    csr_pem: &str,
) -> fleet_provisioning::Result<()> {
    sequencer.subscribe_responses().await?;
    sequencer.create_certificate_from_csr(csr_pem).await?;
    sequencer.register_thing().await?;

    if !sequencer.is_done() {
        return Err(fleet_provisioning::Error::Internal(
            "registration finished without a response".to_string(),
        ));
    }
    Ok(())
}
