use xcp_slave::{
    channel::ChannelError,
    hardware::simulation::SimulationPlatform,
    xcp::{ErrorCode, PID_ERR, PID_RES, XcpSlave, XcpSlaveOptions},
};

const RX: u32 = 0x554;
const TX: u32 = 0x555;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn slave() -> XcpSlave<SimulationPlatform> {
    init_logger();
    let mut s = XcpSlave::new(SimulationPlatform::default(), XcpSlaveOptions::default());
    s.init(RX, TX);
    s
}

fn send(s: &mut XcpSlave<SimulationPlatform>, cmd: &[u8]) -> Vec<u8> {
    s.process_command(cmd).unwrap();
    s.platform().last_transmitted().unwrap().to_vec()
}

fn connected() -> XcpSlave<SimulationPlatform> {
    let mut s = slave();
    assert_eq!(send(&mut s, &[0xFF, 0x00])[0], PID_RES);
    s
}

fn set_mta(s: &mut XcpSlave<SimulationPlatform>, address: u32) {
    let a = address.to_be_bytes();
    assert_eq!(send(s, &[0xF6, 0, 0, 0, a[0], a[1], a[2], a[3]]), vec![PID_RES]);
}

#[test]
fn connect_and_disconnect() {
    let mut s = slave();
    let r = send(&mut s, &[0xFF, 0x00]);
    assert_eq!(r.len(), 8);
    assert_eq!(r, vec![PID_RES, 0x15, 0x00, 8, 0x00, 8, 0x01, 0x01]);
    assert!(s.is_connected());
    assert_eq!(s.platform().transmitted()[0].0, TX);

    assert_eq!(send(&mut s, &[0xFE]), vec![PID_RES]);
    assert!(!s.is_connected());
}

#[test]
fn every_command_needs_a_connection() {
    let mut s = slave();
    for opcode in 0..=0xFEu8 {
        let r = send(&mut s, &[opcode, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(r, vec![PID_ERR, ErrorCode::Sequence.into()], "opcode 0x{opcode:02X}");
    }
    assert!(!s.is_connected());
    assert_eq!(s.mta(), 0);
}

#[test]
fn unknown_command() {
    let mut s = connected();
    assert_eq!(send(&mut s, &[0x42]), vec![PID_ERR, 0x20]);
    assert_eq!(send(&mut s, &[0xF9]), vec![PID_ERR, 0x20]);
}

#[test]
fn get_status_and_comm_mode() {
    let mut s = connected();
    assert_eq!(send(&mut s, &[0xFD]), vec![PID_RES, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(
        send(&mut s, &[0xFB]),
        vec![PID_RES, 0x00, 0x00, 0x00, 7, 0x00, 0x01, 0x01]
    );
    assert_eq!(send(&mut s, &[0xFA, 0x00]), vec![PID_RES, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(send(&mut s, &[0xFC]), vec![PID_ERR, 0x00]);
}

#[test]
fn set_mta_and_upload() {
    let mut s = connected();
    s.platform_mut().load_ram(0x100, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    set_mta(&mut s, 0x100);
    assert_eq!(send(&mut s, &[0xF5, 3]), vec![PID_RES, 0xAA, 0xBB, 0xCC]);
    assert_eq!(s.mta(), 0x103);
    assert_eq!(send(&mut s, &[0xF5, 2]), vec![PID_RES, 0xDD, 0xEE]);
    assert_eq!(s.mta(), 0x105);
}

#[test]
fn short_upload_matches_upload_without_moving_mta() {
    let mut s = connected();
    s.platform_mut().load_ram(0x200, &[1, 2, 3, 4, 5, 6, 7]);
    set_mta(&mut s, 0x40);
    let short = send(&mut s, &[0xF4, 7, 0, 0, 0x00, 0x00, 0x02, 0x00]);
    assert_eq!(s.mta(), 0x40);

    set_mta(&mut s, 0x200);
    let normal = send(&mut s, &[0xF5, 7]);
    assert_eq!(short, normal);
    assert_eq!(short, vec![PID_RES, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn upload_limits() {
    let mut s = connected();
    assert_eq!(send(&mut s, &[0xF5, 8]), vec![PID_ERR, 0x22]);
    assert_eq!(send(&mut s, &[0xF4, 8, 0, 0, 0, 0, 0, 0]), vec![PID_ERR, 0x22]);
    assert_eq!(s.mta(), 0);
}

#[test]
fn download_then_upload() {
    let mut s = connected();
    set_mta(&mut s, 0x100);
    assert_eq!(send(&mut s, &[0xF0, 3, 0x11, 0x22, 0x33]), vec![PID_RES]);
    assert_eq!(&s.platform().ram()[0x100..0x103], &[0x11, 0x22, 0x33]);
    assert_eq!(s.mta(), 0x103);

    set_mta(&mut s, 0x100);
    assert_eq!(send(&mut s, &[0xF5, 3]), vec![PID_RES, 0x11, 0x22, 0x33]);
}

#[test]
fn download_limits() {
    let mut s = connected();
    set_mta(&mut s, 0x100);
    assert_eq!(send(&mut s, &[0xF0, 7, 1, 2, 3, 4, 5, 6]), vec![PID_ERR, 0x22]);
    assert_eq!(send(&mut s, &[0xF0, 4, 1, 2]), vec![PID_ERR, 0x21]);
    assert_eq!(send(&mut s, &[0xED, 1, 0, 0, 0, 0, 1, 0]), vec![PID_ERR, 0x21]);
    assert_eq!(s.mta(), 0x100);
    assert!(s.platform().ram()[0x100..0x106].iter().all(|b| *b == 0));
}

#[test]
fn frames_for_other_ids_are_ignored() {
    let mut s = slave();
    assert!(!s.process_can_frame(0x123, &[0xFF, 0x00]).unwrap());
    assert!(s.platform().transmitted().is_empty());
    assert!(s.process_can_frame(RX, &[0xFF, 0x00]).unwrap());
    assert!(s.is_connected());
}

#[test]
fn empty_frame_has_no_response() {
    let mut s = connected();
    s.platform_mut().clear_transmitted();
    s.process_command(&[]).unwrap();
    assert!(s.platform().transmitted().is_empty());
}

#[test]
fn transmit_failure_is_reported() {
    let mut s = slave();
    s.platform_mut().set_fail_transmit(true);
    assert!(matches!(
        s.process_command(&[0xFF, 0x00]),
        Err(ChannelError::BufferFull)
    ));
}

fn configure_daq(s: &mut XcpSlave<SimulationPlatform>) {
    assert_eq!(send(s, &[0xD6]), vec![PID_RES]);
    assert_eq!(send(s, &[0xD5, 0, 0x00, 0x02]), vec![PID_RES]);
    assert_eq!(send(s, &[0xD4, 0, 0x00, 0x01, 2]), vec![PID_RES]);
    assert_eq!(send(s, &[0xD3, 0, 0x00, 0x01, 0, 2]), vec![PID_RES]);
    assert_eq!(send(s, &[0xD3, 0, 0x00, 0x01, 1, 1]), vec![PID_RES]);
    assert_eq!(send(s, &[0xE2, 0, 0x00, 0x01, 0, 0]), vec![PID_RES]);
    assert_eq!(send(s, &[0xE1, 0xFF, 2, 0, 0x00, 0x00, 0x03, 0x00]), vec![PID_RES]);
    assert_eq!(send(s, &[0xE1, 0xFF, 1, 0, 0x00, 0x00, 0x03, 0x10]), vec![PID_RES]);
    assert_eq!(send(s, &[0xE1, 0xFF, 4, 0, 0x00, 0x00, 0x03, 0x20]), vec![PID_RES]);
    // Mode, list 1, event 2, prescaler 1, priority 0
    assert_eq!(send(s, &[0xE0, 0x10, 0x00, 0x01, 0x00, 0x02, 1, 0]), vec![PID_RES]);
}

#[test]
fn daq_allocation_errors() {
    let mut s = connected();
    assert_eq!(send(&mut s, &[0xD5, 0, 0x00, 0x05]), vec![PID_ERR, 0x30]);
    assert_eq!(send(&mut s, &[0xD4, 0, 0x00, 0x00, 1]), vec![PID_ERR, 0x22]);
    assert_eq!(send(&mut s, &[0xD5, 0, 0x00, 0x01]), vec![PID_RES]);
    assert_eq!(send(&mut s, &[0xD4, 0, 0x00, 0x01, 1]), vec![PID_ERR, 0x22]);
    assert_eq!(send(&mut s, &[0xD4, 0, 0x00, 0x00, 9]), vec![PID_ERR, 0x30]);
    assert_eq!(send(&mut s, &[0xD3, 0, 0x00, 0x00, 0, 1]), vec![PID_ERR, 0x22]);
    assert_eq!(send(&mut s, &[0xE1, 0xFF, 1, 0, 0, 0, 0, 0]), vec![PID_ERR, 0x29]);
    assert_eq!(send(&mut s, &[0xE2, 0, 0x00, 0x00, 0, 0]), vec![PID_ERR, 0x22]);
}

#[test]
fn daq_info() {
    let mut s = connected();
    assert_eq!(
        send(&mut s, &[0xDA]),
        vec![PID_RES, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00, 0x00]
    );
    assert_eq!(
        send(&mut s, &[0xD9]),
        vec![PID_RES, 0x01, 7, 0x01, 7, 0x00, 0x00, 0x01]
    );
    assert_eq!(
        send(&mut s, &[0xD7, 0, 0x00, 0x00]),
        vec![PID_RES, 0x04, 4, 0x00, 0x0A, 0x06, 0x00]
    );
    configure_daq(&mut s);
    assert_eq!(
        send(&mut s, &[0xD8, 0, 0x00, 0x01]),
        vec![PID_RES, 0x00, 2, 7, 0x00, 0x00]
    );
    assert_eq!(send(&mut s, &[0xD8, 0, 0x00, 0x02]), vec![PID_ERR, 0x22]);
}

#[test]
fn daq_clock() {
    let mut s = connected();
    s.platform_mut().set_clock(0x1234_5678);
    assert_eq!(
        send(&mut s, &[0xDC]),
        vec![PID_RES, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]
    );
}

#[test]
fn daq_measurement() {
    let mut s = connected();
    s.platform_mut().load_ram(0x300, &[0xA0, 0xA1]);
    s.platform_mut().load_ram(0x310, &[0xB0]);
    s.platform_mut().load_ram(0x320, &[0xC0, 0xC1, 0xC2, 0xC3]);
    configure_daq(&mut s);

    // Select then start through START_STOP_SYNCH
    assert_eq!(send(&mut s, &[0xDE, 2, 0x00, 0x01]), vec![PID_RES, 8]);
    assert_eq!(send(&mut s, &[0xDD, 1]), vec![PID_RES]);
    assert_eq!(send(&mut s, &[0xFD])[1], 0x40);

    s.platform_mut().clear_transmitted();
    s.send_daq_data(1).unwrap();
    assert!(s.platform().transmitted().is_empty());
    s.send_daq_data(2).unwrap();
    let dtos: Vec<Vec<u8>> = s
        .platform()
        .transmitted()
        .iter()
        .map(|(id, d)| {
            assert_eq!(*id, TX);
            d.clone()
        })
        .collect();
    assert_eq!(
        dtos,
        vec![vec![8, 0xA0, 0xA1, 0xB0], vec![9, 0xC0, 0xC1, 0xC2, 0xC3]]
    );

    assert_eq!(send(&mut s, &[0xDE, 0, 0x00, 0x01]), vec![PID_RES, 8]);
    assert_eq!(send(&mut s, &[0xFD])[1], 0x00);
    assert_eq!(send(&mut s, &[0xDE, 5, 0x00, 0x01]), vec![PID_ERR, 0x27]);
    assert_eq!(send(&mut s, &[0xDD, 3]), vec![PID_ERR, 0x27]);
}

#[test]
fn disconnect_frees_daq() {
    let mut s = connected();
    configure_daq(&mut s);
    assert_eq!(send(&mut s, &[0xDE, 1, 0x00, 0x01]), vec![PID_RES, 8]);
    assert!(s.daq().any_running());
    assert_eq!(send(&mut s, &[0xFE]), vec![PID_RES]);
    assert_eq!(s.daq().list_count(), 0);
    s.platform_mut().clear_transmitted();
    s.send_daq_data(2).unwrap();
    assert!(s.platform().transmitted().is_empty());
}
