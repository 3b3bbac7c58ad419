//! Pure routing of broker events
//!
//! Maps `rumqttc` v5 events onto the small set of outcomes the manager
//! cares about; everything else is infrastructure noise logged at debug.

use rumqttc::v5::Event;

/// Routing decision for one broker event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// ConnAck received; the link is usable.
    ConnectionAcknowledged,
    /// Inbound publish on a subscribed filter.
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Broker closed the link.
    Disconnected,
    /// Protocol bookkeeping (SubAck, PingResp, ...).
    Infrastructure(String),
    /// Outgoing packet echo; handled by rumqttc itself.
    Outgoing,
}

/// Route one MQTT event (pure function).
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => {
            use rumqttc::v5::mqttbytes::v5::Packet;
            match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                other => EventRoute::Infrastructure(format!("{other:?}")),
            }
        }
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, Packet, Publish,
    };
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_connack_route() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert!(matches!(
            route_event(&event),
            EventRoute::ConnectionAcknowledged
        ));
    }

    #[test]
    fn test_disconnect_route() {
        let event = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(route_event(&event), EventRoute::Disconnected));
    }

    #[test]
    fn test_publish_route() {
        let event = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: true,
            topic: Bytes::from("sensor/trellis/buttons"),
            pkid: 0,
            payload: Bytes::from(vec![0x01, 0x02]),
            properties: None,
        }));

        match route_event(&event) {
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                assert_eq!(topic, "sensor/trellis/buttons");
                assert_eq!(payload, vec![0x01, 0x02]);
                assert!(retain);
            }
            other => panic!("expected MessageReceived, got {other:?}"),
        }
    }
}
