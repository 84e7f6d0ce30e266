//! Discovery of the ring at power-up.
//!
//! The Controller sends an init frame counting zero Workers. Each Worker takes the incremented count as its `pico_id`
//! and passes the frame on, so when the frame returns to the Controller it carries the number of Workers. The ring must
//! be closed for this to terminate, and it only makes sense to run again after every node was reset.

use crate::{
    configuration::MAX_WORKERS,
    error::Error,
    frame::{AdminFrame, Command, ErrorCode, Frame},
    identity::{NodeIdentity, RoleKind},
    link::LinkRx,
    role::NodeRole,
};
use wmidi::U7;

/// Runs the bootstrap of `role`, receiving on `link`, and returns the identity it was assigned.
pub async fn bootstrap(role: &mut impl NodeRole, link: &mut impl LinkRx) -> Result<NodeIdentity, Error> {
    let identity = match role.kind() {
        RoleKind::Controller => count_workers(role, link).await?,
        RoleKind::Worker => await_init(role, link).await?,
    };
    #[cfg(feature = "defmt")]
    defmt::info!("Bootstrap complete: {}", identity);
    Ok(identity)
}

async fn count_workers(role: &mut impl NodeRole, link: &mut impl LinkRx) -> Result<NodeIdentity, Error> {
    role.send_downstream(&AdminFrame::init(0).to_packet()).await?;

    loop {
        let packet = link.receive().await?;
        let count = match Frame::decode(&packet) {
            Ok(Frame::Admin(frame)) if frame.command == Command::Init => frame.payload0(),
            _ => {
                // traffic from Workers that were up before this Controller
                role.surface_output(&packet).await?;
                continue;
            }
        };

        // tells the host how many Workers there are
        role.surface_output(&packet).await?;
        if count > MAX_WORKERS {
            #[cfg(feature = "defmt")]
            defmt::error!("{} Workers answered, only {} can be addressed", count, MAX_WORKERS);
            let report = AdminFrame::error(ErrorCode::TooManyNodes, 0);
            role.surface_output(&report.to_packet()).await?;
        }
        return Ok(NodeIdentity::controller(count));
    }
}

async fn await_init(role: &mut impl NodeRole, link: &mut impl LinkRx) -> Result<NodeIdentity, Error> {
    loop {
        let packet = link.receive().await?;
        match Frame::decode(&packet) {
            Ok(Frame::Admin(frame)) if frame.command == Command::Init => {
                let pico_id = frame.payload0().saturating_add(1).min(0x7F);
                let forwarded = AdminFrame {
                    payload: [U7::from_u8_lossy(pico_id), frame.payload[1]],
                    ..frame
                };
                role.send_downstream(&forwarded.to_packet()).await?;
                return Ok(NodeIdentity::worker(pico_id));
            }
            _ => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Expected an init frame, got {:#x}", packet);
                role.relay_or_terminate(&packet).await?;
                let report = AdminFrame::error(ErrorCode::ExpectingInit, NodeIdentity::UNASSIGNED_ID);
                role.surface_output(&report.to_packet()).await?;
            }
        }
    }
}
