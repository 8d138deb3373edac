pub mod shm_leak;
