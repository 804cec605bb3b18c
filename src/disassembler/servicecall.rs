//! Extended software-interrupt calling conventions.
//!
//! Windows 3.x/9x virtual device drivers call services of other VxDs with `INT 20h` followed by
//! a 32-bit service identifier that is not part of the instruction encoding. The loader patches
//! these sites at run time; on disk the decoder would otherwise try to execute the identifier.
//! The explorer consults a [`ServiceCall`] to skip these trailing bytes while it assumes
//! protected mode, and the renderer uses it to annotate the call.

use std::fmt;

/// A convention where a software interrupt is followed by inline data
pub trait ServiceCall: fmt::Debug + Send + Sync {
    /// Interrupt vector that introduces the call
    fn vector(&self) -> u8;

    /// Number of inline bytes following the `INT` instruction
    fn trailing_bytes(&self) -> u32 {
        4
    }

    /// Listing annotation for the inline bytes, appended after the instruction text
    fn annotate(&self, trailing: &[u8]) -> Option<String>;
}

/// `VxDCall` / `VMMCall`: `INT 20h` followed by the service number and the VxD id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VxdServiceCall {
    vector: u8,
}

impl VxdServiceCall {
    /// The VxD convention on a different interrupt vector
    #[must_use]
    pub fn with_vector(vector: u8) -> VxdServiceCall {
        VxdServiceCall { vector }
    }
}

impl Default for VxdServiceCall {
    fn default() -> Self {
        VxdServiceCall {
            vector: VXD_CALL_VECTOR,
        }
    }
}

/// Interrupt vector of `VxDCall`
pub const VXD_CALL_VECTOR: u8 = 0x20;

/// VxD id of the virtual machine manager
pub const VMM_DEVICE_ID: u16 = 0x0001;

const VXD_NAMES: &[(u16, &str)] = &[
    (0x0001, "VMM"),
    (0x0002, "Debug"),
    (0x0003, "VPICD"),
    (0x0004, "VDMAD"),
    (0x0005, "VTD"),
    (0x0006, "V86MMGR"),
    (0x0007, "PageSwap"),
    (0x0008, "Parity"),
    (0x0009, "Reboot"),
    (0x000A, "VDD"),
    (0x000B, "VSD"),
    (0x000C, "VMD"),
    (0x000D, "VKD"),
    (0x000E, "VCD"),
    (0x000F, "VPD"),
    (0x0010, "BlockDev"),
    (0x0011, "VMCPD"),
    (0x0012, "EBIOS"),
    (0x0013, "BIOSXlat"),
    (0x0014, "VNETBIOS"),
    (0x0015, "DOSMGR"),
    (0x0016, "WINLOAD"),
    (0x0017, "SHELL"),
    (0x0018, "VMPoll"),
    (0x0019, "VPROD"),
    (0x001A, "DOSNET"),
    (0x001B, "VFD"),
    (0x001C, "VDD2"),
    (0x001D, "WINDEBUG"),
    (0x001E, "TSRLoad"),
    (0x001F, "BiosHook"),
    (0x0020, "Int13"),
    (0x0021, "PageFile"),
    (0x0022, "SCSI"),
    (0x0023, "MCA_POS"),
    (0x0024, "SCSIFD"),
    (0x0025, "VPEND"),
    (0x0026, "APM"),
];

// Indexed by service number
const VMM_SERVICES: &[&str] = &[
    "Get_VMM_Version",
    "Get_Cur_VM_Handle",
    "Test_Cur_VM_Handle",
    "Get_Sys_VM_Handle",
    "Test_Sys_VM_Handle",
    "Validate_VM_Handle",
    "Get_VMM_Reenter_Count",
    "Begin_Reentrant_Execution",
    "End_Reentrant_Execution",
    "Install_V86_Break_Point",
    "Remove_V86_Break_Point",
    "Allocate_V86_Call_Back",
    "Allocate_PM_Call_Back",
    "Call_When_VM_Returns",
    "Schedule_Global_Event",
    "Schedule_VM_Event",
    "Call_Global_Event",
    "Call_VM_Event",
    "Cancel_Global_Event",
    "Cancel_VM_Event",
    "Call_Priority_VM_Event",
    "Cancel_Priority_VM_Event",
    "Get_NMI_Handler_Addr",
    "Set_NMI_Handler_Addr",
    "Hook_NMI_Event",
    "Call_When_VM_Ints_Enabled",
    "Enable_VM_Ints",
    "Disable_VM_Ints",
    "Map_Flat",
    "Map_Lin_To_VM_Addr",
    "Adjust_Exec_Priority",
    "Begin_Critical_Section",
    "End_Critical_Section",
    "End_Crit_And_Suspend",
    "Claim_Critical_Section",
    "Release_Critical_Section",
    "Call_When_Not_Critical",
    "Create_Semaphore",
    "Destroy_Semaphore",
    "Wait_Semaphore",
    "Signal_Semaphore",
    "Get_Crit_Section_Status",
    "Call_When_Task_Switched",
    "Suspend_VM",
    "Resume_VM",
    "No_Fail_Resume_VM",
    "Nuke_VM",
    "Crash_Cur_VM",
    "Get_Execution_Focus",
    "Set_Execution_Focus",
    "Get_Time_Slice_Priority",
    "Set_Time_Slice_Priority",
    "Get_Time_Slice_Granularity",
    "Set_Time_Slice_Granularity",
    "Get_Time_Slice_Info",
    "Adjust_Execution_Time",
    "Release_Time_Slice",
    "Wake_Up_VM",
    "Call_When_Idle",
    "Get_Next_VM_Handle",
    "Set_Global_Time_Out",
    "Set_VM_Time_Out",
    "Cancel_Time_Out",
    "Get_System_Time",
    "Get_VM_Exec_Time",
    "Hook_V86_Int_Chain",
    "Get_V86_Int_Vector",
    "Set_V86_Int_Vector",
    "Get_PM_Int_Vector",
    "Set_PM_Int_Vector",
    "Simulate_Int",
    "Simulate_Iret",
    "Simulate_Far_Call",
    "Simulate_Far_Jmp",
    "Simulate_Far_Ret",
    "Simulate_Far_Ret_N",
    "Build_Int_Stack_Frame",
    "Simulate_Push",
    "Simulate_Pop",
    "_HeapAllocate",
    "_HeapReAllocate",
    "_HeapFree",
    "_HeapGetSize",
    "_PageAllocate",
    "_PageReAllocate",
    "_PageFree",
    "_PageLock",
    "_PageUnLock",
];

/// Name of a well-known VxD id
#[must_use]
pub fn vxd_name(id: u16) -> Option<&'static str> {
    VXD_NAMES
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| *name)
}

/// Name of a VMM service number
#[must_use]
pub fn vmm_service_name(service: u16) -> Option<&'static str> {
    VMM_SERVICES.get(usize::from(service)).copied()
}

impl ServiceCall for VxdServiceCall {
    fn vector(&self) -> u8 {
        self.vector
    }

    fn annotate(&self, trailing: &[u8]) -> Option<String> {
        let [s0, s1, v0, v1, ..] = trailing else {
            return None;
        };

        // bit 15 distinguishes VxDJmp from VxDCall
        let service = u16::from_le_bytes([*s0, *s1]) & 0x7FFF;
        let vxd = u16::from_le_bytes([*v0, *v1]);

        let mut text = format!("\t; VxdCall 0x{vxd:04X},0x{service:04X}");
        if let Some(name) = vxd_name(vxd) {
            text.push(' ');
            text.push_str(name);
            if vxd == VMM_DEVICE_ID {
                if let Some(service) = vmm_service_name(service) {
                    text.push(' ');
                    text.push_str(service);
                }
            }
        }

        Some(text)
    }
}
