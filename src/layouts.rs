binary_layout::binary_layout!(config_record_layout, BigEndian, {
    magic: u8,
    version: u8,
    role: u8,
    reserved: u8,
    device_address: u16,
    checksum: u16,
});
