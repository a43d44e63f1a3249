//! EVSE controller fed by a charger driver through `watch` channels.
//!
//! The driver owns the [`EvseFeeds`] half: it publishes control pilot
//! state, present values and authorization decisions, and observes what the
//! session asks of the hardware (HLC charging, control mode, stop).

use tokio::sync::watch;

use super::traits::{AuthorizationResponse, ControllerError, EvseController};
use crate::context::{EvseDataContext, EvseUpdate};
use crate::negotiation::service::default_parameter_sets;
use crate::protocol::types::{
    AuthMode, ControlMode, CpState, EnergyTransferMode, EvseNotification, MeterInfo, ParameterSet,
    Processing, Protocol, ServiceV20,
};
use crate::protocol::v2::{AcEvseStatus, DcEvseStatus};

/// Static charger description.
#[derive(Debug, Clone)]
pub struct ChargerProfile {
    pub evse_id: String,
    pub capabilities: EvseDataContext,
    pub energy_modes: Vec<EnergyTransferMode>,
    pub energy_services: Vec<ServiceV20>,
    pub control_modes: Vec<ControlMode>,
}

/// Driver side of an [`ExternalEvseController`].
pub struct EvseFeeds {
    pub cp_state: watch::Sender<CpState>,
    pub present: watch::Sender<EvseUpdate>,
    /// `None` while no decision has been made.
    pub authorization: watch::Sender<Option<AuthorizationResponse>>,
    pub notification: watch::Sender<EvseNotification>,
    pub cable_check: watch::Sender<Processing>,
    pub meter: watch::Sender<Option<MeterInfo>>,
    pub hlc_charging: watch::Receiver<bool>,
    pub control_mode: watch::Receiver<Option<ControlMode>>,
    pub stop: watch::Receiver<bool>,
}

pub struct ExternalEvseController {
    profile: ChargerProfile,
    cp_state: watch::Receiver<CpState>,
    present: watch::Receiver<EvseUpdate>,
    authorization: watch::Receiver<Option<AuthorizationResponse>>,
    notification: watch::Receiver<EvseNotification>,
    cable_check: watch::Receiver<Processing>,
    meter: watch::Receiver<Option<MeterInfo>>,
    hlc_charging: watch::Sender<bool>,
    control_mode: watch::Sender<Option<ControlMode>>,
    stop: watch::Sender<bool>,
}

impl ExternalEvseController {
    pub fn new(profile: ChargerProfile) -> (Self, EvseFeeds) {
        let (cp_tx, cp_rx) = watch::channel(CpState::A1);
        let (present_tx, present_rx) = watch::channel(EvseUpdate::default());
        let (auth_tx, auth_rx) = watch::channel(None);
        let (notification_tx, notification_rx) = watch::channel(EvseNotification::None);
        let (cable_tx, cable_rx) = watch::channel(Processing::Ongoing);
        let (meter_tx, meter_rx) = watch::channel(None);
        let (hlc_tx, hlc_rx) = watch::channel(false);
        let (mode_tx, mode_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);

        let controller = Self {
            profile,
            cp_state: cp_rx,
            present: present_rx,
            authorization: auth_rx,
            notification: notification_rx,
            cable_check: cable_rx,
            meter: meter_rx,
            hlc_charging: hlc_tx,
            control_mode: mode_tx,
            stop: stop_tx,
        };
        let feeds = EvseFeeds {
            cp_state: cp_tx,
            present: present_tx,
            authorization: auth_tx,
            notification: notification_tx,
            cable_check: cable_tx,
            meter: meter_tx,
            hlc_charging: hlc_rx,
            control_mode: mode_rx,
            stop: stop_rx,
        };
        (controller, feeds)
    }
}

impl EvseController for ExternalEvseController {
    fn evse_id(&self, _protocol: Protocol) -> Result<String, ControllerError> {
        Ok(self.profile.evse_id.clone())
    }

    fn data_context(&self) -> Result<EvseDataContext, ControllerError> {
        Ok(self.profile.capabilities)
    }

    fn present_values(&self) -> Result<EvseUpdate, ControllerError> {
        Ok(*self.present.borrow())
    }

    fn cp_state(&self) -> Result<CpState, ControllerError> {
        Ok(*self.cp_state.borrow())
    }

    fn is_authorized(
        &self,
        mode: AuthMode,
        _id_token: Option<&str>,
    ) -> Result<AuthorizationResponse, ControllerError> {
        tracing::debug!(mode = mode.name(), "Querying charger for authorization");
        Ok(self
            .authorization
            .borrow()
            .unwrap_or_else(AuthorizationResponse::ongoing))
    }

    fn offered_energy_services(&self) -> Result<Vec<ServiceV20>, ControllerError> {
        Ok(self.profile.energy_services.clone())
    }

    fn supported_energy_transfer_modes(&self) -> Result<Vec<EnergyTransferMode>, ControllerError> {
        Ok(self.profile.energy_modes.clone())
    }

    fn service_parameter_sets(
        &self,
        service: ServiceV20,
    ) -> Result<Vec<ParameterSet>, ControllerError> {
        Ok(default_parameter_sets(
            service,
            &self.profile.control_modes,
            self.profile.capabilities.nominal_voltage,
        )?)
    }

    fn supported_control_modes(&self) -> Result<Vec<ControlMode>, ControllerError> {
        Ok(self.profile.control_modes.clone())
    }

    fn set_control_mode(&self, mode: ControlMode) -> Result<(), ControllerError> {
        self.control_mode.send_replace(Some(mode));
        Ok(())
    }

    fn set_hlc_charging(&self, enabled: bool) -> Result<(), ControllerError> {
        self.hlc_charging.send_replace(enabled);
        Ok(())
    }

    fn cable_check_status(&self) -> Result<Processing, ControllerError> {
        Ok(*self.cable_check.borrow())
    }

    fn evse_notification(&self) -> Result<EvseNotification, ControllerError> {
        Ok(*self.notification.borrow())
    }

    fn ac_evse_status(&self) -> Result<AcEvseStatus, ControllerError> {
        Ok(AcEvseStatus {
            notification_max_delay: 0,
            evse_notification: *self.notification.borrow(),
            rcd: false,
        })
    }

    fn dc_evse_status(&self) -> Result<DcEvseStatus, ControllerError> {
        Ok(DcEvseStatus {
            evse_notification: *self.notification.borrow(),
            ..Default::default()
        })
    }

    fn meter_info(&self) -> Result<Option<MeterInfo>, ControllerError> {
        Ok(self.meter.borrow().clone())
    }

    fn stop_charger(&self) -> Result<(), ControllerError> {
        self.hlc_charging.send_replace(false);
        self.stop.send_replace(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::AuthorizationStatus;

    fn profile() -> ChargerProfile {
        ChargerProfile {
            evse_id: "DE*EXT*E0001".to_string(),
            capabilities: EvseDataContext {
                nominal_voltage: Some(230.0),
                ..Default::default()
            },
            energy_modes: vec![EnergyTransferMode::AcThreePhaseCore],
            energy_services: vec![ServiceV20::Ac],
            control_modes: vec![ControlMode::Scheduled],
        }
    }

    #[test]
    fn test_reads_published_values() {
        let (controller, feeds) = ExternalEvseController::new(profile());
        assert_eq!(controller.cp_state().unwrap(), CpState::A1);

        feeds.cp_state.send_replace(CpState::C2);
        feeds.present.send_replace(EvseUpdate {
            present_voltage: Some(398.0),
            ..Default::default()
        });
        assert_eq!(controller.cp_state().unwrap(), CpState::C2);
        assert_eq!(controller.present_values().unwrap().present_voltage, Some(398.0));
    }

    #[test]
    fn test_authorization_pending_until_published() {
        let (controller, feeds) = ExternalEvseController::new(profile());
        let pending = controller.is_authorized(AuthMode::Eim, None).unwrap();
        assert_eq!(pending.status, AuthorizationStatus::Ongoing);

        feeds
            .authorization
            .send_replace(Some(AuthorizationResponse::accepted()));
        let decided = controller.is_authorized(AuthMode::Eim, None).unwrap();
        assert_eq!(decided.status, AuthorizationStatus::Accepted);
    }

    #[test]
    fn test_driver_observes_requests() {
        let (controller, feeds) = ExternalEvseController::new(profile());
        controller.set_hlc_charging(true).unwrap();
        controller.set_control_mode(ControlMode::Scheduled).unwrap();
        assert!(*feeds.hlc_charging.borrow());
        assert_eq!(*feeds.control_mode.borrow(), Some(ControlMode::Scheduled));

        controller.stop_charger().unwrap();
        assert!(!*feeds.hlc_charging.borrow());
        assert!(*feeds.stop.borrow());
    }
}
