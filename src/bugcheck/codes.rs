// Axel '0vercl0k' Souchet - October 5 2026
//! Bug-check codes: the name table and what counts as a plausible code.
use crate::config::AddressHeuristics;

/// Values that show up where a bug-check code is expected but are not ones:
/// fill patterns, placeholders and the infamous `0x65F4`.
pub const FAKE_CODES: &[u32] = &[
    0x65f4,
    0x1234,
    0xffff,
    0x1_0000,
    0x1234_5678,
    0xdead_beef,
    0xcccc_cccc,
    0xcdcd_cdcd,
    0xfeee_feee,
    0xbaad_f00d,
    0xffff_ffff,
];

/// Codes outside of the documented ranges that are real.
const SPECIAL_CODES: &[u32] = &[
    0x2_0001,
    0x1000_007e,
    0x1000_007f,
    0x1000_008e,
    0x1000_00ea,
    0x4000_008a,
    0xdead_dead,
];

/// `STATUS_BREAKPOINT`; the exception code the kernel uses to carry a
/// bug-check through the exception stream of a minidump.
pub const STATUS_BREAKPOINT: u32 = 0x8000_0003;

/// Sorted by code.
static BUGCHECK_NAMES: &[(u32, &str)] = &[
    (0x01, "APC_INDEX_MISMATCH"),
    (0x02, "DEVICE_QUEUE_NOT_BUSY"),
    (0x03, "INVALID_AFFINITY_SET"),
    (0x04, "INVALID_DATA_ACCESS_TRAP"),
    (0x05, "INVALID_PROCESS_ATTACH_ATTEMPT"),
    (0x06, "INVALID_PROCESS_DETACH_ATTEMPT"),
    (0x07, "INVALID_SOFTWARE_INTERRUPT"),
    (0x08, "IRQL_NOT_DISPATCH_LEVEL"),
    (0x09, "IRQL_NOT_GREATER_OR_EQUAL"),
    (0x0a, "IRQL_NOT_LESS_OR_EQUAL"),
    (0x0b, "NO_EXCEPTION_HANDLING_SUPPORT"),
    (0x0c, "MAXIMUM_WAIT_OBJECTS_EXCEEDED"),
    (0x0d, "MUTEX_LEVEL_NUMBER_VIOLATION"),
    (0x0e, "NO_USER_MODE_CONTEXT"),
    (0x0f, "SPIN_LOCK_ALREADY_OWNED"),
    (0x10, "SPIN_LOCK_NOT_OWNED"),
    (0x11, "THREAD_NOT_MUTEX_OWNER"),
    (0x12, "TRAP_CAUSE_UNKNOWN"),
    (0x13, "EMPTY_THREAD_REAPER_LIST"),
    (0x14, "CREATE_DELETE_LOCK_NOT_LOCKED"),
    (0x15, "LAST_CHANCE_CALLED_FROM_KMODE"),
    (0x16, "CID_HANDLE_CREATION"),
    (0x17, "CID_HANDLE_DELETION"),
    (0x18, "REFERENCE_BY_POINTER"),
    (0x19, "BAD_POOL_HEADER"),
    (0x1a, "MEMORY_MANAGEMENT"),
    (0x1b, "PFN_SHARE_COUNT"),
    (0x1c, "PFN_REFERENCE_COUNT"),
    (0x1d, "NO_SPIN_LOCK_AVAILABLE"),
    (0x1e, "KMODE_EXCEPTION_NOT_HANDLED"),
    (0x1f, "SHARED_RESOURCE_CONV_ERROR"),
    (0x20, "KERNEL_APC_PENDING_DURING_EXIT"),
    (0x21, "QUOTA_UNDERFLOW"),
    (0x22, "FILE_SYSTEM"),
    (0x23, "FAT_FILE_SYSTEM"),
    (0x24, "NTFS_FILE_SYSTEM"),
    (0x25, "NPFS_FILE_SYSTEM"),
    (0x26, "CDFS_FILE_SYSTEM"),
    (0x27, "RDR_FILE_SYSTEM"),
    (0x28, "CORRUPT_ACCESS_TOKEN"),
    (0x29, "SECURITY_SYSTEM"),
    (0x2a, "INCONSISTENT_IRP"),
    (0x2b, "PANIC_STACK_SWITCH"),
    (0x2c, "PORT_DRIVER_INTERNAL"),
    (0x2d, "SCSI_DISK_DRIVER_INTERNAL"),
    (0x2e, "DATA_BUS_ERROR"),
    (0x2f, "INSTRUCTION_BUS_ERROR"),
    (0x30, "SET_OF_INVALID_CONTEXT"),
    (0x31, "PHASE0_INITIALIZATION_FAILED"),
    (0x32, "PHASE1_INITIALIZATION_FAILED"),
    (0x33, "UNEXPECTED_INITIALIZATION_CALL"),
    (0x34, "CACHE_MANAGER"),
    (0x35, "NO_MORE_IRP_STACK_LOCATIONS"),
    (0x36, "DEVICE_REFERENCE_COUNT_NOT_ZERO"),
    (0x37, "FLOPPY_INTERNAL_ERROR"),
    (0x38, "SERIAL_DRIVER_INTERNAL"),
    (0x39, "SYSTEM_EXIT_OWNED_MUTEX"),
    (0x3a, "SYSTEM_UNWIND_PREVIOUS_USER"),
    (0x3b, "SYSTEM_SERVICE_EXCEPTION"),
    (0x3c, "INTERRUPT_UNWIND_ATTEMPTED"),
    (0x3d, "INTERRUPT_EXCEPTION_NOT_HANDLED"),
    (0x3e, "MULTIPROCESSOR_CONFIGURATION_NOT_SUPPORTED"),
    (0x3f, "NO_MORE_SYSTEM_PTES"),
    (0x40, "TARGET_MDL_TOO_SMALL"),
    (0x41, "MUST_SUCCEED_POOL_EMPTY"),
    (0x42, "ATDISK_DRIVER_INTERNAL"),
    (0x43, "NO_SUCH_PARTITION"),
    (0x44, "MULTIPLE_IRP_COMPLETE_REQUESTS"),
    (0x45, "INSUFFICIENT_SYSTEM_MAP_REGS"),
    (0x46, "DEREF_UNKNOWN_LOGON_SESSION"),
    (0x47, "REF_UNKNOWN_LOGON_SESSION"),
    (0x48, "CANCEL_STATE_IN_COMPLETED_IRP"),
    (0x49, "PAGE_FAULT_WITH_INTERRUPTS_OFF"),
    (0x4a, "IRQL_GT_ZERO_AT_SYSTEM_SERVICE"),
    (0x4b, "STREAMS_INTERNAL_ERROR"),
    (0x4c, "FATAL_UNHANDLED_HARD_ERROR"),
    (0x4d, "NO_PAGES_AVAILABLE"),
    (0x4e, "PFN_LIST_CORRUPT"),
    (0x4f, "NDIS_INTERNAL_ERROR"),
    (0x50, "PAGE_FAULT_IN_NONPAGED_AREA"),
    (0x51, "REGISTRY_ERROR"),
    (0x52, "MAILSLOT_FILE_SYSTEM"),
    (0x53, "NO_BOOT_DEVICE"),
    (0x54, "LM_SERVER_INTERNAL_ERROR"),
    (0x55, "DATA_COHERENCY_EXCEPTION"),
    (0x56, "INSTRUCTION_COHERENCY_EXCEPTION"),
    (0x57, "XNS_INTERNAL_ERROR"),
    (0x58, "FTDISK_INTERNAL_ERROR"),
    (0x59, "PINBALL_FILE_SYSTEM"),
    (0x5a, "CRITICAL_SERVICE_FAILED"),
    (0x5b, "SET_ENV_VAR_FAILED"),
    (0x5c, "HAL_INITIALIZATION_FAILED"),
    (0x5d, "UNSUPPORTED_PROCESSOR"),
    (0x5e, "OBJECT_INITIALIZATION_FAILED"),
    (0x5f, "SECURITY_INITIALIZATION_FAILED"),
    (0x60, "PROCESS_INITIALIZATION_FAILED"),
    (0x61, "HAL1_INITIALIZATION_FAILED"),
    (0x62, "OBJECT1_INITIALIZATION_FAILED"),
    (0x63, "SECURITY1_INITIALIZATION_FAILED"),
    (0x64, "SYMBOLIC_INITIALIZATION_FAILED"),
    (0x65, "MEMORY1_INITIALIZATION_FAILED"),
    (0x66, "CACHE_INITIALIZATION_FAILED"),
    (0x67, "CONFIG_INITIALIZATION_FAILED"),
    (0x68, "FILE_INITIALIZATION_FAILED"),
    (0x69, "IO1_INITIALIZATION_FAILED"),
    (0x6a, "LPC_INITIALIZATION_FAILED"),
    (0x6b, "PROCESS1_INITIALIZATION_FAILED"),
    (0x6c, "REFMON_INITIALIZATION_FAILED"),
    (0x6d, "SESSION1_INITIALIZATION_FAILED"),
    (0x6e, "SESSION2_INITIALIZATION_FAILED"),
    (0x6f, "SESSION3_INITIALIZATION_FAILED"),
    (0x70, "SESSION4_INITIALIZATION_FAILED"),
    (0x71, "SESSION5_INITIALIZATION_FAILED"),
    (0x72, "ASSIGN_DRIVE_LETTERS_FAILED"),
    (0x73, "CONFIG_LIST_FAILED"),
    (0x74, "BAD_SYSTEM_CONFIG_INFO"),
    (0x75, "CANNOT_WRITE_CONFIGURATION"),
    (0x76, "PROCESS_HAS_LOCKED_PAGES"),
    (0x77, "KERNEL_STACK_INPAGE_ERROR"),
    (0x78, "PHASE0_EXCEPTION"),
    (0x79, "MISMATCHED_HAL"),
    (0x7a, "KERNEL_DATA_INPAGE_ERROR"),
    (0x7b, "INACCESSIBLE_BOOT_DEVICE"),
    (0x7c, "BUGCODE_NDIS_DRIVER"),
    (0x7d, "INSTALL_MORE_MEMORY"),
    (0x7e, "SYSTEM_THREAD_EXCEPTION_NOT_HANDLED"),
    (0x7f, "UNEXPECTED_KERNEL_MODE_TRAP"),
    (0x80, "NMI_HARDWARE_FAILURE"),
    (0x81, "SPIN_LOCK_INIT_FAILURE"),
    (0x82, "DFS_FILE_SYSTEM"),
    (0x85, "SETUP_FAILURE"),
    (0x8b, "MBR_CHECKSUM_MISMATCH"),
    (0x8e, "KERNEL_MODE_EXCEPTION_NOT_HANDLED"),
    (0x8f, "PP0_INITIALIZATION_FAILED"),
    (0x90, "PP1_INITIALIZATION_FAILED"),
    (0x92, "UP_DRIVER_ON_MP_SYSTEM"),
    (0x93, "INVALID_KERNEL_HANDLE"),
    (0x94, "KERNEL_STACK_LOCKED_AT_EXIT"),
    (0x96, "INVALID_WORK_QUEUE_ITEM"),
    (0x97, "BOUND_IMAGE_UNSUPPORTED"),
    (0x98, "END_OF_NT_EVALUATION_PERIOD"),
    (0x99, "INVALID_REGION_OR_SEGMENT"),
    (0x9a, "SYSTEM_LICENSE_VIOLATION"),
    (0x9b, "UDFS_FILE_SYSTEM"),
    (0x9c, "MACHINE_CHECK_EXCEPTION"),
    (0x9e, "USER_MODE_HEALTH_MONITOR"),
    (0x9f, "DRIVER_POWER_STATE_FAILURE"),
    (0xa0, "INTERNAL_POWER_ERROR"),
    (0xa1, "PCI_BUS_DRIVER_INTERNAL"),
    (0xa2, "MEMORY_IMAGE_CORRUPT"),
    (0xa3, "ACPI_DRIVER_INTERNAL"),
    (0xa4, "CNSS_FILE_SYSTEM_FILTER"),
    (0xa5, "ACPI_BIOS_ERROR"),
    (0xa7, "BAD_EXHANDLE"),
    (0xab, "SESSION_HAS_VALID_POOL_ON_EXIT"),
    (0xac, "HAL_MEMORY_ALLOCATION"),
    (0xad, "VIDEO_DRIVER_DEBUG_REPORT_REQUEST"),
    (0xb4, "VIDEO_DRIVER_INIT_FAILURE"),
    (0xb8, "ATTEMPTED_SWITCH_FROM_DPC"),
    (0xb9, "CHIPSET_DETECTED_ERROR"),
    (0xba, "SESSION_HAS_VALID_VIEWS_ON_EXIT"),
    (0xbb, "NETWORK_BOOT_INITIALIZATION_FAILED"),
    (0xbc, "NETWORK_BOOT_DUPLICATE_ADDRESS"),
    (0xbd, "INVALID_HIBERNATED_STATE"),
    (0xbe, "ATTEMPTED_WRITE_TO_READONLY_MEMORY"),
    (0xbf, "MUTEX_ALREADY_OWNED"),
    (0xc1, "SPECIAL_POOL_DETECTED_MEMORY_CORRUPTION"),
    (0xc2, "BAD_POOL_CALLER"),
    (0xc4, "DRIVER_VERIFIER_DETECTED_VIOLATION"),
    (0xc5, "DRIVER_CORRUPTED_EXPOOL"),
    (0xc6, "DRIVER_CAUGHT_MODIFYING_FREED_POOL"),
    (0xc7, "TIMER_OR_DPC_INVALID"),
    (0xc8, "IRQL_UNEXPECTED_VALUE"),
    (0xc9, "DRIVER_VERIFIER_IOMANAGER_VIOLATION"),
    (0xca, "PNP_DETECTED_FATAL_ERROR"),
    (0xcb, "DRIVER_LEFT_LOCKED_PAGES_IN_PROCESS"),
    (0xcc, "PAGE_FAULT_IN_FREED_SPECIAL_POOL"),
    (0xcd, "PAGE_FAULT_BEYOND_END_OF_ALLOCATION"),
    (0xce, "DRIVER_UNLOADED_WITHOUT_CANCELLING_PENDING_OPERATIONS"),
    (0xcf, "TERMINAL_SERVER_DRIVER_MADE_INCORRECT_MEMORY_REFERENCE"),
    (0xd0, "DRIVER_CORRUPTED_MMPOOL"),
    (0xd1, "DRIVER_IRQL_NOT_LESS_OR_EQUAL"),
    (0xd2, "BUGCODE_ID_DRIVER"),
    (0xd3, "DRIVER_PORTION_MUST_BE_NONPAGED"),
    (0xd4, "SYSTEM_SCAN_AT_RAISED_IRQL_CAUGHT_IMPROPER_DRIVER_UNLOAD"),
    (0xd5, "DRIVER_PAGE_FAULT_IN_FREED_SPECIAL_POOL"),
    (0xd6, "DRIVER_PAGE_FAULT_BEYOND_END_OF_ALLOCATION"),
    (0xd7, "DRIVER_UNMAPPING_INVALID_VIEW"),
    (0xd8, "DRIVER_USED_EXCESSIVE_PTES"),
    (0xd9, "LOCKED_PAGES_TRACKER_CORRUPTION"),
    (0xda, "SYSTEM_PTE_MISUSE"),
    (0xdb, "DRIVER_CORRUPTED_SYSPTES"),
    (0xdc, "DRIVER_INVALID_STACK_ACCESS"),
    (0xde, "POOL_CORRUPTION_IN_FILE_AREA"),
    (0xdf, "IMPERSONATING_WORKER_THREAD"),
    (0xe0, "ACPI_BIOS_FATAL_ERROR"),
    (0xe1, "WORKER_THREAD_RETURNED_AT_BAD_IRQL"),
    (0xe2, "MANUALLY_INITIATED_CRASH"),
    (0xe3, "RESOURCE_NOT_OWNED"),
    (0xe4, "WORKER_INVALID"),
    (0xe6, "DRIVER_VERIFIER_DMA_VIOLATION"),
    (0xe7, "INVALID_FLOATING_POINT_STATE"),
    (0xe8, "INVALID_CANCEL_OF_FILE_OPEN"),
    (0xe9, "ACTIVE_EX_WORKER_THREAD_TERMINATION"),
    (0xea, "THREAD_STUCK_IN_DEVICE_DRIVER"),
    (0xeb, "DIRTY_MAPPED_PAGES_CONGESTION"),
    (0xec, "SESSION_HAS_VALID_SPECIAL_POOL_ON_EXIT"),
    (0xed, "UNMOUNTABLE_BOOT_VOLUME"),
    (0xef, "CRITICAL_PROCESS_DIED"),
    (0xf0, "STORAGE_MINIPORT_ERROR"),
    (0xf1, "SCSI_VERIFIER_DETECTED_VIOLATION"),
    (0xf2, "HARDWARE_INTERRUPT_STORM"),
    (0xf3, "DISORDERLY_SHUTDOWN"),
    (0xf4, "CRITICAL_OBJECT_TERMINATION"),
    (0xf5, "FLTMGR_FILE_SYSTEM"),
    (0xf6, "PCI_VERIFIER_DETECTED_VIOLATION"),
    (0xf7, "DRIVER_OVERRAN_STACK_BUFFER"),
    (0xf8, "RAMDISK_BOOT_INITIALIZATION_FAILED"),
    (0xf9, "DRIVER_RETURNED_STATUS_REPARSE_FOR_VOLUME_OPEN"),
    (0xfa, "HTTP_DRIVER_CORRUPTED"),
    (0xfc, "ATTEMPTED_EXECUTE_OF_NOEXECUTE_MEMORY"),
    (0xfd, "DIRTY_NOWRITE_PAGES_CONGESTION"),
    (0xfe, "BUGCODE_USB_DRIVER"),
    (0xff, "RESERVE_QUEUE_OVERFLOW"),
    (0x100, "LOADER_BLOCK_MISMATCH"),
    (0x101, "CLOCK_WATCHDOG_TIMEOUT"),
    (0x102, "DPC_WATCHDOG_TIMEOUT"),
    (0x104, "AGP_INVALID_ACCESS"),
    (0x105, "AGP_GART_CORRUPTION"),
    (0x106, "AGP_ILLEGALLY_REPROGRAMMED"),
    (0x108, "THIRD_PARTY_FILE_SYSTEM_FAILURE"),
    (0x109, "CRITICAL_STRUCTURE_CORRUPTION"),
    (0x10a, "APP_TAGGING_INITIALIZATION_FAILED"),
    (0x10c, "FSRTL_EXTRA_CREATE_PARAMETER_VIOLATION"),
    (0x10d, "WDF_VIOLATION"),
    (0x10e, "VIDEO_MEMORY_MANAGEMENT_INTERNAL"),
    (0x10f, "RESOURCE_MANAGER_EXCEPTION_NOT_HANDLED"),
    (0x111, "RECURSIVE_NMI"),
    (0x112, "MSRPC_STATE_VIOLATION"),
    (0x113, "VIDEO_DXGKRNL_FATAL_ERROR"),
    (0x114, "VIDEO_SHADOW_DRIVER_FATAL_ERROR"),
    (0x115, "AGP_INTERNAL"),
    (0x116, "VIDEO_TDR_FAILURE"),
    (0x117, "VIDEO_TDR_TIMEOUT_DETECTED"),
    (0x119, "VIDEO_SCHEDULER_INTERNAL_ERROR"),
    (0x11a, "EM_INITIALIZATION_FAILURE"),
    (0x11b, "DRIVER_RETURNED_HOLDING_CANCEL_LOCK"),
    (0x11c, "ATTEMPTED_WRITE_TO_CM_PROTECTED_STORAGE"),
    (0x11d, "EVENT_TRACING_FATAL_ERROR"),
    (0x11e, "TOO_MANY_RECURSIVE_FAULTS"),
    (0x11f, "INVALID_DRIVER_HANDLE"),
    (0x120, "BITLOCKER_FATAL_ERROR"),
    (0x121, "DRIVER_VIOLATION"),
    (0x122, "WHEA_INTERNAL_ERROR"),
    (0x123, "CRYPTO_SELF_TEST_FAILURE"),
    (0x124, "WHEA_UNCORRECTABLE_ERROR"),
    (0x125, "NMR_INVALID_STATE"),
    (0x126, "NETIO_INVALID_POOL_CALLER"),
    (0x127, "PAGE_NOT_ZERO"),
    (0x128, "WORKER_THREAD_RETURNED_WITH_BAD_IO_PRIORITY"),
    (0x129, "WORKER_THREAD_RETURNED_WITH_BAD_PAGING_IO_PRIORITY"),
    (0x12a, "MUI_NO_VALID_SYSTEM_LANGUAGE"),
    (0x12b, "FAULTY_HARDWARE_CORRUPTED_PAGE"),
    (0x12c, "EXFAT_FILE_SYSTEM"),
    (0x12d, "VOLSNAP_OVERLAPPED_TABLE_ACCESS"),
    (0x12e, "INVALID_MDL_RANGE"),
    (0x12f, "VHD_BOOT_INITIALIZATION_FAILED"),
    (0x130, "DYNAMIC_ADD_PROCESSOR_MISMATCH"),
    (0x131, "INVALID_EXTENDED_PROCESSOR_STATE"),
    (0x132, "RESOURCE_OWNER_POINTER_INVALID"),
    (0x133, "DPC_WATCHDOG_VIOLATION"),
    (0x134, "DRIVE_EXTENDER"),
    (0x135, "REGISTRY_FILTER_DRIVER_EXCEPTION"),
    (0x136, "VHD_BOOT_HOST_VOLUME_NOT_ENOUGH_SPACE"),
    (0x137, "WIN32K_HANDLE_MANAGER"),
    (0x138, "GPIO_CONTROLLER_DRIVER_ERROR"),
    (0x139, "KERNEL_SECURITY_CHECK_FAILURE"),
    (0x13a, "KERNEL_MODE_HEAP_CORRUPTION"),
    (0x13b, "PASSIVE_INTERRUPT_ERROR"),
    (0x13c, "INVALID_IO_BOOST_STATE"),
    (0x13d, "CRITICAL_INITIALIZATION_FAILURE"),
    (0x140, "STORAGE_DEVICE_ABNORMALITY_DETECTED"),
    (0x143, "PROCESSOR_DRIVER_INTERNAL"),
    (0x144, "BUGCODE_USB3_DRIVER"),
    (0x145, "SECURE_BOOT_VIOLATION"),
    (0x147, "ABNORMAL_RESET_DETECTED"),
    (0x149, "REFS_FILE_SYSTEM"),
    (0x14a, "KERNEL_WMI_INTERNAL"),
    (0x14b, "SOC_SUBSYSTEM_FAILURE"),
    (0x14c, "FATAL_ABNORMAL_RESET_ERROR"),
    (0x14d, "EXCEPTION_SCOPE_INVALID"),
    (0x14e, "SOC_CRITICAL_DEVICE_REMOVED"),
    (0x14f, "PDC_WATCHDOG_TIMEOUT"),
    (0x150, "TCPIP_AOAC_NIC_ACTIVE_REFERENCE_LEAK"),
    (0x151, "UNSUPPORTED_INSTRUCTION_MODE"),
    (0x152, "INVALID_PUSH_LOCK_FLAGS"),
    (0x153, "KERNEL_LOCK_ENTRY_LEAKED_ON_THREAD_TERMINATION"),
    (0x154, "UNEXPECTED_STORE_EXCEPTION"),
    (0x155, "OS_DATA_TAMPERING"),
    (0x156, "WINSOCK_DETECTED_HUNG_CLOSESOCKET_LIVEDUMP"),
    (0x157, "KERNEL_THREAD_PRIORITY_FLOOR_VIOLATION"),
    (0x158, "ILLEGAL_IOMMU_PAGE_FAULT"),
    (0x159, "HAL_ILLEGAL_IOMMU_PAGE_FAULT"),
    (0x15a, "SDBUS_INTERNAL_ERROR"),
    (0x15b, "WORKER_THREAD_RETURNED_WITH_SYSTEM_PAGE_PRIORITY_ACTIVE"),
    (0x15c, "PDC_WATCHDOG_TIMEOUT_LIVEDUMP"),
    (0x15d, "SOC_SUBSYSTEM_FAILURE_LIVEDUMP"),
    (0x15e, "BUGCODE_NDIS_DRIVER_LIVE_DUMP"),
    (0x15f, "CONNECTED_STANDBY_WATCHDOG_TIMEOUT_LIVEDUMP"),
    (0x160, "WIN32K_ATOMIC_CHECK_FAILURE"),
    (0x161, "LIVE_SYSTEM_DUMP"),
    (0x162, "KERNEL_AUTO_BOOST_INVALID_LOCK_RELEASE"),
    (0x163, "WORKER_THREAD_TEST_CONDITION"),
    (0x164, "WIN32K_CRITICAL_FAILURE"),
    (0x16c, "INVALID_RUNDOWN_PROTECTION_FLAGS"),
    (0x16d, "INVALID_SLOT_ALLOCATOR_FLAGS"),
    (0x16e, "ERESOURCE_INVALID_RELEASE"),
    (0x175, "PREVIOUS_FATAL_ABNORMAL_RESET_ERROR"),
    (0x178, "ELAM_DRIVER_DETECTED_FATAL_ERROR"),
    (0x17b, "PROFILER_CONFIGURATION_ILLEGAL"),
    (0x17e, "MICROCODE_REVISION_MISMATCH"),
    (0x187, "VIDEO_DWMINIT_TIMEOUT_FALLBACK_BDD"),
    (0x189, "BAD_OBJECT_HEADER"),
    (0x18b, "SECURE_KERNEL_ERROR"),
    (0x18c, "HYPERGUARD_VIOLATION"),
    (0x18d, "SECURE_FAULT_UNHANDLED"),
    (0x18e, "KERNEL_PARTITION_REFERENCE_VIOLATION"),
    (0x190, "WIN32K_CRITICAL_FAILURE_LIVEDUMP"),
    (0x191, "PF_DETECTED_CORRUPTION"),
    (0x192, "KERNEL_AUTO_BOOST_LOCK_ACQUISITION_WITH_RAISED_IRQL"),
    (0x193, "VIDEO_DXGKRNL_LIVEDUMP"),
    (0x195, "SMB_SERVER_LIVEDUMP"),
    (0x196, "LOADER_ROLLBACK_DETECTED"),
    (0x197, "WIN32K_SECURITY_FAILURE"),
    (0x198, "UFX_LIVEDUMP"),
    (0x199, "KERNEL_STORAGE_SLOT_IN_USE"),
    (0x19a, "WORKER_THREAD_RETURNED_WHILE_ATTACHED_TO_SILO"),
    (0x19b, "TTM_FATAL_ERROR"),
    (0x19c, "WIN32K_POWER_WATCHDOG_TIMEOUT"),
    (0x1a0, "TTM_WATCHDOG_TIMEOUT"),
    (0x1a2, "WIN32K_CALLOUT_WATCHDOG_BUGCHECK"),
    (0x1aa, "EXCEPTION_ON_INVALID_STACK"),
    (0x1ab, "UNWIND_ON_INVALID_STACK"),
    (0x1c4, "DRIVER_VERIFIER_DETECTED_VIOLATION_LIVEDUMP"),
    (0x1c6, "FAST_ERESOURCE_PRECONDITION_VIOLATION"),
    (0x1c7, "STORE_DATA_STRUCTURE_CORRUPTION"),
    (0x1c8, "MANUALLY_INITIATED_POWER_BUTTON_HOLD"),
    (0x1ca, "SYNTHETIC_WATCHDOG_TIMEOUT"),
    (0x1cb, "INVALID_SILO_DETACH"),
    (0x1cd, "INVALID_CALLBACK_STACK_ADDRESS"),
    (0x1ce, "INVALID_KERNEL_STACK_ADDRESS"),
    (0x1cf, "HARDWARE_WATCHDOG_TIMEOUT"),
    (0x1d0, "CPI_FIRMWARE_WATCHDOG_TIMEOUT"),
    (0x1d2, "WORKER_THREAD_INVALID_STATE"),
    (0x1d3, "WFP_INVALID_OPERATION"),
    (0x1d5, "DRIVER_PNP_WATCHDOG"),
    (0x1d6, "WORKER_THREAD_RETURNED_WITH_NON_DEFAULT_WORKLOAD_CLASS"),
    (0x1d7, "EFS_FATAL_ERROR"),
    (0x1d8, "UCMUCSI_FAILURE"),
    (0x1d9, "HAL_IOMMU_INTERNAL_ERROR"),
    (0x1da, "HAL_BLOCKED_PROCESSOR_INTERNAL_ERROR"),
    (0x1db, "IPI_WATCHDOG_TIMEOUT"),
    (0x1dc, "DMA_COMMON_BUFFER_VECTOR_ERROR"),
    (0x1dd, "BUGCODE_MBBADAPTER_DRIVER"),
    (0x1de, "BUGCODE_WIFIADAPTER_DRIVER"),
    (0x1df, "PROCESSOR_START_TIMEOUT"),
    (0x1e4, "VIDEO_DXGKRNL_SYSMM_FATAL_ERROR"),
    (0x1e9, "ILLEGAL_ATS_INITIALIZATION"),
    (0x1ea, "SECURE_PCI_CONFIG_SPACE_ACCESS_VIOLATION"),
    (0x1eb, "DAM_WATCHDOG_TIMEOUT"),
    (0x1ed, "HANDLE_ERROR_ON_CRITICAL_THREAD"),
    (0x356, "XBOX_ERACTRL_CS_TIMEOUT"),
    (0xbfe, "BC_BLUETOOTH_VERIFIER_FAULT"),
    (0xbff, "BC_BTHMINI_VERIFIER_FAULT"),
    (0x2_0001, "HYPERVISOR_ERROR"),
    (0x1000_007e, "SYSTEM_THREAD_EXCEPTION_NOT_HANDLED_M"),
    (0x1000_007f, "UNEXPECTED_KERNEL_MODE_TRAP_M"),
    (0x1000_008e, "KERNEL_MODE_EXCEPTION_NOT_HANDLED_M"),
    (0x1000_00ea, "THREAD_STUCK_IN_DEVICE_DRIVER_M"),
    (0x4000_008a, "THREAD_TERMINATE_HELD_MUTEX"),
    (0xc000_0218, "STATUS_CANNOT_LOAD_REGISTRY_FILE"),
    (0xc000_021a, "STATUS_SYSTEM_PROCESS_TERMINATED"),
    (0xc000_0221, "STATUS_IMAGE_CHECKSUM_MISMATCH"),
    (0xdead_dead, "MANUALLY_INITIATED_CRASH1"),
];

/// Look up the symbolic name of a bug-check code. Unknown codes have none.
#[must_use]
pub fn bugcheck_name(code: u32) -> Option<&'static str> {
    BUGCHECK_NAMES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| BUGCHECK_NAMES[idx].1)
}

/// Is `code` a known fabricated value?
#[must_use]
pub fn is_fake_code(code: u32) -> bool {
    FAKE_CODES.contains(&code)
}

/// Is it a NTSTATUS looking error code?
#[must_use]
pub fn is_status_code(code: u32) -> bool {
    (0xc000_0000..=0xc0ff_ffff).contains(&code)
}

/// Can `code` be a bug-check code? It has to be named, or to be in one of the
/// documented ranges; fabricated values are always rejected.
#[must_use]
pub fn is_valid_bugcheck_code(code: u32, heuristics: &AddressHeuristics) -> bool {
    if code == 0 || is_fake_code(code) {
        return false;
    }

    if bugcheck_name(code).is_some() || SPECIAL_CODES.contains(&code) {
        return true;
    }

    match code {
        0x01..=0xff | 0x100..=0x1ff | 0x1000..=0x1_0000 => true,
        c if is_status_code(c) => heuristics.accept_status_codes,
        _ => false,
    }
}
