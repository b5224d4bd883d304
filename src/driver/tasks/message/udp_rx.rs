#[derive(Debug)]
pub(crate) enum UdpRxMessage {
    Poison,
}
