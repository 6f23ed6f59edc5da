//! Identifier Allow-List
//!
//! Vehicle bus identifiers forwarded to subscribers. Anything else is dropped
//! at ingestion.

/// Identifiers of interest, sorted ascending for binary search
pub static VEHICLE_BUS_IDS: &[u32] = &[
    0x00C, // UI Status
    0x04F, // GPS Lat Long
    0x082, // UI Trip Planning
    0x102, // VCLEFT Door Status
    0x103, // VCRIGHT Door Status
    0x108, // DIR Torque
    0x118, // Drive System Status
    0x123, // UI Alert Matrix1
    0x126, // Rear HV Status
    0x129, // Steering Angle
    0x132, // HV Battery
    0x13D, // CP Charge Status
    0x142, // VCLEFT Liftgate Status
    0x154, // Rear Torque Old
    0x186, // DIF Torque
    0x1A5, // Front HV Status
    0x1D4, // Front Torque Old
    0x1D5, // Front Torque
    0x1D8, // Rear Torque
    0x201, // VCFRONT Logging And Vitals 10Hz
    0x20A, // HVP Contactor State
    0x20C, // VCRIGHT Hvac Request
    0x212, // BMS Status
    0x214, // Fast Charge VA
    0x215, // FC Isolation
    0x217, // FC Info
    0x21D, // CP Evse Status
    0x221, // VCFRONT LV Power State
    0x224, // PCS DCDC Status
    0x228, // EPB Right Status
    0x229, // Gear Lever
    0x22E, // PARK Sdi Rear
    0x23D, // DCP charge Status
    0x241, // VCFRONT Coolant
    0x243, // VCRIGHT Hvac Status
    0x244, // Fast Charge Limits
    0x247, // DAS Autopilot Debug
    0x249, // SCCM Left Stalk
    0x252, // Power Available
    0x257, // UI Speed
    0x25D, // DCP Status
    0x261, // 12v Batt Status
    0x263, // VCRIGHT Logging 10Hz
    0x264, // Charge Line Status
    0x266, // Rear Inverter Power
    0x267, // DI Vehicle Estimates
    0x268, // System Power
    0x281, // VCFRONT CMP Request
    0x282, // VCLEFT Hvac Blower Feedback
    0x284, // UI Vehicle Modes
    0x287, // PTC Cabin Heat Sensor Status
    0x288, // EPB Left Status
    0x292, // BMS SOC
    0x293, // UI Chassis Control
    0x29D, // CP DC Charge Status
    0x2A8, // CMPD State
    0x2B3, // VCRIGHT Logging 1Hz
    0x2B4, // PCS DCDC Rail Status
    0x2B6, // DI Chassis Control Status
    0x2C1, // VCFront 10hz
    0x2C4, // PCS Logging
    0x2D2, // BMS VA Limits
    0x2E1, // VCFRONT Status
    0x2E5, // Front Inverter Power
    0x2F1, // VCFRONT EFuse Debug Status
    0x2F3, // UI Hvac Request
    0x300, // BMS Info
    0x301, // VCFRONT Info
    0x309, // DAS Object
    0x312, // BMS Thermal
    0x313, // UI Track Mode Settings
    0x315, // Rear Inverter Temps
    0x318, // System Time UTC
    0x31C, // CC Chg Status
    0x31D, // CC Chg Status 2
    0x320, // BMS Alert Matrix
    0x321, // VCFRONT Sensors
    0x32C, // CC Log Data
    0x332, // Batt Cell Min Max
    0x333, // UI Charge Request
    0x334, // UI Powertrain Control
    0x335, // Rear DI Info
    0x336, // Max Power Rating
    0x33A, // UI Range SOC
    0x352, // BMS Energy Status
    0x376, // Front Inverter Temps
    0x381, // VCFRONT Logging 1Hz
    0x383, // VCRIGHT Ths Status
    0x393, // VCRIGHT Epbm Debug
    0x395, // DIR Oil Pump
    0x396, // Front Oil Pump
    0x399, // DAS Status
    0x3A1, // VCFRONT Vehicle Status
    0x3B2, // BMS Log2
    0x3B3, // UI Vehicle Control2
    0x3B6, // Odometer
    0x3BB, // UI Power
    0x3C2, // VCLEFT_switch Status
    0x3C3, // VCRIGHT Switch Status
    0x3D2, // Total Charge Discharge
    0x3D8, // Elevation
    0x3D9, // UI GPS Vehicle Speed
    0x3E2, // VCLEFT Light Status
    0x3E3, // VCRIGHT Light Status
    0x3E9, // DAS Body Controls
    0x3F2, // BMS Counters
    0x3F5, // VCFRONT Lighting
    0x3FE, // Brake Temps Estimated
    0x401, // Cell Voltages
    0x405, // VIN
    0x42A, // VCSEC TPMS Connection Data
    0x43D, // CP Charge Status Log
    0x51E, // FC Info
    0x528, // Unix Time
    0x541, // Fast Charge Max Limits
    0x556, // Front DI Temps
    0x557, // Front Thermal Control
    0x5D5, // Rear DI Temps
    0x5D7, // Rear Thermal Control
    0x628, // UDS MCU to PCS
    0x629, // UDS PCS to MCU
    0x656, // Front DI Info
    0x743, // VCRIGHT Recall Status
    0x757, // DIF Debugs
    0x75D, // CP Sensor Data
    0x7AA, // HVP Debug Message
    0x7D5, // DIR Debug
    0x7FF, // Car Config
];

/// Whether an identifier is on the allow-list
pub fn is_listed(id: u32) -> bool {
    VEHICLE_BUS_IDS.binary_search(&id).is_ok()
}
