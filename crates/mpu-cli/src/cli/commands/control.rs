//! `mpu pause|resume|cancel|status <id>` – talk to a running `mpu upload`.

use anyhow::{bail, Result};

use crate::cli::control_socket::{self, ControlAction};

pub async fn run_control(action: ControlAction, id: &str) -> Result<()> {
    let path = mpu_core::control::default_control_socket_path()?;
    let reply = control_socket::send_request(&path, action, id).await?;
    if let Some(message) = reply.strip_prefix("error: ") {
        bail!("{}", message);
    }
    match action {
        ControlAction::Status => println!("{}", reply),
        ControlAction::Pause => println!("Paused upload {id}"),
        ControlAction::Resume => println!("Resumed upload {id}"),
        ControlAction::Cancel => println!("Cancelled upload {id}"),
    }
    Ok(())
}
